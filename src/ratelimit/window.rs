//! Window bookkeeping for a single rate limit bucket.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Common window lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    /// Per-second rate limiting
    Second,
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Second => Duration::from_secs(1),
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }

    /// Get the length of this time window in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.duration().as_millis() as u64
    }
}

/// Quota applied to a bucket: `max_requests` admissions per `window_ms`.
///
/// Supplied by the caller on every check and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admissions per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// `max_requests` admissions per `window`.
    pub fn per(max_requests: u32, window: TimeWindow) -> Self {
        Self::new(max_requests, window.as_millis())
    }
}

/// Admission state for one bucket.
///
/// Persisted as `{ "count": n, "resetTime": ms }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    /// Admissions counted in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window ends
    pub reset_time: u64,
}

impl RateLimitEntry {
    /// Open a window at `now_ms` with its first admission already counted.
    pub fn open(now_ms: u64, config: &RateLimitConfig) -> Self {
        Self {
            count: 1,
            reset_time: now_ms.saturating_add(config.window_ms),
        }
    }

    /// Whether the window has ended. The reset instant itself still belongs
    /// to the window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.reset_time
    }

    /// Quota left in this window under `config`.
    pub fn remaining(&self, config: &RateLimitConfig) -> u32 {
        config.max_requests.saturating_sub(self.count)
    }

    /// Milliseconds until the window ends, zero once it has.
    pub fn millis_until_reset(&self, now_ms: u64) -> u64 {
        self.reset_time.saturating_sub(now_ms)
    }
}
