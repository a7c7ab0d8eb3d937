//! Core rate limiter implementation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::window::{RateLimitConfig, RateLimitEntry};
use crate::clock::{Clock, SystemClock};
use crate::storage::Storage;

/// Storage key the limiter snapshot is written under by default.
pub const DEFAULT_STORAGE_KEY: &str = "kobo_rate_limits";

/// Point-in-time view of a bucket, computed without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether a `check_limit` issued now would admit
    pub allowed_next: bool,
    /// Quota left in the current window
    pub remaining: u32,
    /// Milliseconds until the current window ends
    pub reset_after_ms: u64,
    /// Quota ceiling the status was computed against
    pub limit: u32,
}

/// Advisory per-key rate limiter.
///
/// Each key owns a fixed window that opens on its first admitted request and
/// lasts `window_ms`. The table of windows is mirrored to a [`Storage`]
/// backend after every change and reloaded on construction, so quotas carry
/// across restarts on the same device. Storage failures never reach the
/// caller; the in-memory table stays authoritative.
///
/// The table sits behind a single mutex, so an `Arc<RateLimiter>` can be
/// shared freely and all checks are totally ordered.
pub struct RateLimiter<S, C = SystemClock> {
    /// Open windows indexed by bucket key
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    /// Durable mirror of `entries`
    storage: S,
    /// Wall-clock source
    clock: C,
    /// Key the snapshot is stored under
    storage_key: String,
}

impl<S: Storage> RateLimiter<S, SystemClock> {
    /// Create a limiter over `storage` using the system clock.
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, SystemClock)
    }
}

impl<S: Storage, C: Clock> RateLimiter<S, C> {
    /// Create a limiter with an explicit clock.
    pub fn with_clock(storage: S, clock: C) -> Self {
        Self::with_options(storage, clock, DEFAULT_STORAGE_KEY)
    }

    /// Create a limiter with an explicit clock and storage key.
    ///
    /// Any snapshot found under `storage_key` is loaded. A missing,
    /// unreadable or malformed snapshot yields an empty table.
    pub fn with_options(storage: S, clock: C, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let entries = Self::load(&storage, &storage_key);

        debug!(
            storage_key = %storage_key,
            entries = entries.len(),
            "Rate limiter initialized"
        );

        Self {
            entries: Mutex::new(entries),
            storage,
            clock,
            storage_key,
        }
    }

    fn load(storage: &S, storage_key: &str) -> HashMap<String, RateLimitEntry> {
        let raw = match storage.get(storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                warn!(storage_key = %storage_key, error = %e, "Failed to read rate limit snapshot");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(storage_key = %storage_key, error = %e, "Discarding malformed rate limit snapshot");
                HashMap::new()
            }
        }
    }

    fn persist(&self, entries: &HashMap<String, RateLimitEntry>) {
        let serialized = match serde_json::to_string(entries) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "Failed to serialize rate limit snapshot");
                return;
            }
        };

        if let Err(e) = self.storage.set(&self.storage_key, &serialized) {
            warn!(
                storage_key = %self.storage_key,
                error = %e,
                "Failed to persist rate limit snapshot; continuing in memory"
            );
        }
    }

    /// Check whether `key` may perform one more request under `config`,
    /// counting it if so.
    ///
    /// The first request of a fresh window is always admitted, even when
    /// `max_requests` is zero. Use [`check_limit_strict`](Self::check_limit_strict)
    /// to refuse zero quotas outright. A denial leaves state untouched.
    pub fn check_limit(&self, key: &str, config: &RateLimitConfig) -> bool {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        trace!(key = %key, max_requests = config.max_requests, "Checking rate limit");

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        let admitted = match entries.get_mut(key) {
            None => {
                let entry = RateLimitEntry::open(now, config);
                debug!(
                    key = %key,
                    window_ms = config.window_ms,
                    reset_time = entry.reset_time,
                    "Opening rate limit window"
                );
                entries.insert(key.to_string(), entry);
                true
            }
            Some(entry) if entry.count >= config.max_requests => {
                debug!(
                    key = %key,
                    count = entry.count,
                    limit = config.max_requests,
                    "Rate limit exceeded"
                );
                return false;
            }
            Some(entry) => {
                entry.count += 1;
                true
            }
        };

        self.persist(&entries);
        admitted
    }

    /// Like [`check_limit`](Self::check_limit), but a zero quota denies
    /// without opening a window.
    pub fn check_limit_strict(&self, key: &str, config: &RateLimitConfig) -> bool {
        if config.max_requests == 0 {
            debug!(key = %key, "Rate limit denied by zero quota");
            return false;
        }
        self.check_limit(key, config)
    }

    /// Quota left for `key` under `config`.
    ///
    /// Absent and expired windows report the full quota. Never mutates state.
    pub fn get_remaining(&self, key: &str, config: &RateLimitConfig) -> u32 {
        let now = self.clock.now_millis();
        let entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.remaining(config),
            _ => config.max_requests,
        }
    }

    /// Milliseconds until `key`'s window resets, or zero if it has none.
    pub fn get_reset_time(&self, key: &str) -> u64 {
        let now = self.clock.now_millis();
        let entries = self.entries.lock();

        entries
            .get(key)
            .map_or(0, |entry| entry.millis_until_reset(now))
    }

    /// Forget `key`'s window. Unknown keys are ignored.
    pub fn reset(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            debug!(key = %key, "Rate limit window reset");
        }
        self.persist(&entries);
    }

    /// Remaining quota, reset delay and next-check outcome for `key`.
    pub fn status(&self, key: &str, config: &RateLimitConfig) -> RateLimitStatus {
        let now = self.clock.now_millis();
        let entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => RateLimitStatus {
                allowed_next: entry.count < config.max_requests,
                remaining: entry.remaining(config),
                reset_after_ms: entry.millis_until_reset(now),
                limit: config.max_requests,
            },
            _ => RateLimitStatus {
                allowed_next: true,
                remaining: config.max_requests,
                reset_after_ms: 0,
                limit: config.max_requests,
            },
        }
    }

    /// Drop every expired window, returning how many were removed.
    ///
    /// Storage is only written when something was removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();

        if purged > 0 {
            debug!(purged = purged, "Purged expired rate limit windows");
            self.persist(&entries);
        }
        purged
    }

    /// Copy of the current table, as it would be persisted.
    pub fn snapshot(&self) -> HashMap<String, RateLimitEntry> {
        self.entries.lock().clone()
    }

    /// Get the number of tracked windows, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no windows are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Key the snapshot is stored under.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }
}
