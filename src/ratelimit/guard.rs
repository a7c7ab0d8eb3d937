//! Wrapping async work behind a rate limit check.

use std::future::Future;

use tracing::info;

use super::limiter::RateLimiter;
use super::window::RateLimitConfig;
use crate::clock::Clock;
use crate::error::QuotaExceeded;
use crate::storage::Storage;

/// Run `operation` only if `key` is within its quota.
///
/// When the limiter denies, the operation is never started and the call
/// fails with [`QuotaExceeded`] carrying the seconds until the window resets.
/// Otherwise the operation's own result is returned as is. There is no retry
/// or queueing.
pub async fn with_rate_limit<S, C, F, Fut, T, E>(
    limiter: &RateLimiter<S, C>,
    key: &str,
    config: &RateLimitConfig,
    operation: F,
) -> Result<T, E>
where
    S: Storage,
    C: Clock,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<QuotaExceeded>,
{
    if !limiter.check_limit(key, config) {
        let exceeded = QuotaExceeded::from_millis(limiter.get_reset_time(key));
        info!(
            key = %key,
            retry_after_secs = exceeded.retry_after_secs,
            "Refusing rate limited operation"
        );
        return Err(exceeded.into());
    }

    operation().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::KoboError;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_limiter() -> (RateLimiter<MemoryStorage, Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (
            RateLimiter::with_clock(MemoryStorage::new(), Arc::clone(&clock)),
            clock,
        )
    }

    #[tokio::test]
    async fn test_admitted_operation_runs() {
        let (limiter, _) = test_limiter();
        let config = RateLimitConfig::new(2, 60_000);

        let result: Result<u32, KoboError> =
            with_rate_limit(&limiter, "AI_GENERATION:alice", &config, || async { Ok(7) }).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(limiter.get_remaining("AI_GENERATION:alice", &config), 1);
    }

    #[tokio::test]
    async fn test_denied_operation_never_runs() {
        let (limiter, clock) = test_limiter();
        let config = RateLimitConfig::new(1, 60_000);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let run = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, KoboError>(())
        };

        with_rate_limit(&limiter, "key", &config, run).await.unwrap();
        clock.advance(30_500);
        let err = with_rate_limit(&limiter, "key", &config, run)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            // 29.5s left rounds up to 30
            KoboError::QuotaExceeded(e) => assert_eq!(e.retry_after_secs, 30),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_operation_error_passes_through() {
        let (limiter, _) = test_limiter();
        let config = RateLimitConfig::new(5, 60_000);

        let result: Result<(), KoboError> = with_rate_limit(&limiter, "key", &config, || async {
            Err(KoboError::Config("backend rejected".to_string()))
        })
        .await;

        match result {
            Err(KoboError::Config(msg)) => assert_eq!(msg, "backend rejected"),
            other => panic!("unexpected result: {other:?}"),
        }
        // The failed operation still consumed quota.
        assert_eq!(limiter.get_remaining("key", &config), 4);
    }

    #[test]
    fn test_custom_error_type() {
        #[derive(Debug, PartialEq)]
        enum MintError {
            Limited(u64),
        }

        impl From<QuotaExceeded> for MintError {
            fn from(e: QuotaExceeded) -> Self {
                MintError::Limited(e.retry_after_secs)
            }
        }

        let (limiter, _) = test_limiter();
        let config = RateLimitConfig::new(1, 300_000);

        let mint = || async { Ok::<_, MintError>("minted") };

        let first = tokio_test::block_on(with_rate_limit(&limiter, "NFT_MINTING:0xabc", &config, mint));
        let second = tokio_test::block_on(with_rate_limit(&limiter, "NFT_MINTING:0xabc", &config, mint));

        assert_eq!(first, Ok("minted"));
        assert_eq!(second, Err(MintError::Limited(300)));
    }
}
