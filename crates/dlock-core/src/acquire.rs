use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::engine::LockEngine;
use crate::error::StoreError;

/// Unbounded wait: the spec's `timeout = -1` default.
pub const UNBOUNDED: i64 = -1;

/// The acquisition loop shared by both lock flavors: repeatedly call
/// `engine.try_write()`, honoring `blocking`/`timeout_secs` exactly as
/// specified.
///
/// `timeout_secs <= 0` (including the documented default of `-1`) means
/// "never time out" — the loop only stops trying because it succeeded or
/// because `blocking` is false. This preserves the source behavior where the
/// timeout check is gated on `timeout > 0`: a caller who passes `timeout = 0`
/// gets the same unbounded retry-every-second loop as `timeout = -1`, not a
/// single non-blocking attempt.
pub async fn acquire(engine: &dyn LockEngine, blocking: bool, timeout_secs: i64) -> Result<bool, StoreError> {
    let start = Instant::now();

    loop {
        if engine.try_write().await? {
            return Ok(true);
        }

        if !blocking {
            return Ok(false);
        }

        if timeout_secs > 0 && Instant::now() > start + Duration::from_secs(timeout_secs as u64) {
            return Ok(false);
        }

        sleep(Duration::from_secs(1)).await;
    }
}

/// Same contract as [`acquire`], but returns early (as a failed acquire) the
/// moment `cancel` is tripped. Spec §4.2 calls for "implementations should
/// expose a cancellation token that, when tripped, causes the next backoff
/// to return failure" — this is additive over the plain loop above, which
/// remains the documented default entry point with no cancellation hook.
pub async fn acquire_cancellable(
    engine: &dyn LockEngine,
    blocking: bool,
    timeout_secs: i64,
    cancel: &CancellationToken,
) -> Result<bool, StoreError> {
    let start = Instant::now();

    loop {
        if engine.try_write().await? {
            return Ok(true);
        }

        if !blocking || cancel.is_cancelled() {
            return Ok(false);
        }

        if timeout_secs > 0 && Instant::now() > start + Duration::from_secs(timeout_secs as u64) {
            return Ok(false);
        }

        tokio::select! {
            () = sleep(Duration::from_secs(1)) => {}
            () = cancel.cancelled() => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    /// A [`LockEngine`] whose `try_write` succeeds on the Nth call.
    struct Flaky {
        succeed_on_attempt: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl LockEngine for Flaky {
        async fn try_write(&self) -> Result<bool, StoreError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(attempt >= self.succeed_on_attempt)
        }

        async fn verify_owner(&self) -> Result<bool, StoreError> {
            unimplemented!()
        }

        async fn delete(&self) -> Result<bool, StoreError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn non_blocking_single_attempt_no_sleep() {
        let engine = Flaky {
            succeed_on_attempt: 100,
            attempts: AtomicUsize::new(0),
        };
        let result = acquire(&engine, false, UNBOUNDED).await.unwrap();
        assert!(!result);
        assert_eq!(engine.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_retries_until_success() {
        let engine = Flaky {
            succeed_on_attempt: 3,
            attempts: AtomicUsize::new(0),
        };
        let result = acquire(&engine, true, UNBOUNDED).await.unwrap();
        assert!(result);
        assert_eq!(engine.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_bounds_the_wait() {
        let engine = Flaky {
            succeed_on_attempt: usize::MAX,
            attempts: AtomicUsize::new(0),
        };
        let start = Instant::now();
        let result = acquire(&engine, true, 3).await.unwrap();
        assert!(!result);
        assert!(Instant::now() >= start + Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_wait() {
        let engine = Arc::new(Flaky {
            succeed_on_attempt: usize::MAX,
            attempts: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel_clone.cancel();
        });

        let result = acquire_cancellable(engine.as_ref(), true, UNBOUNDED, &cancel)
            .await
            .unwrap();
        assert!(!result);
    }
}
