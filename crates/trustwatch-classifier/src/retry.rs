//! Retry with exponential back-off and jitter for classifier calls.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (timeouts, connection failures, 5xx). Non-transient
//! errors — [`ClassifierError::InvalidInput`] and malformed responses — are
//! returned immediately without any retry.

use std::future::Future;
use std::time::Duration;

use crate::error::ClassifierError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - [`ClassifierError::Timeout`] — the call may succeed once load drops.
/// - [`ClassifierError::Unavailable`] — 5xx-equivalent transient failures.
/// - [`ClassifierError::Http`] on timeout or connect failures.
///
/// **Not retriable (surfaced immediately):**
/// - [`ClassifierError::InvalidInput`] — malformed input; retrying won't fix it.
/// - [`ClassifierError::Deserialize`] — malformed response; retrying won't fix it.
pub(crate) fn is_retriable(err: &ClassifierError) -> bool {
    match err {
        ClassifierError::Timeout | ClassifierError::Unavailable { .. } => true,
        ClassifierError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ClassifierError::InvalidInput { .. } | ClassifierError::Deserialize { .. } => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors.
///
/// Back-off schedule with `backoff_base_ms = 500`:
///
/// | Attempt | Sleep before next attempt     |
/// |---------|-------------------------------|
/// | 1       | 500 ms × 2⁰ ± 25 % jitter    |
/// | 2       | 500 ms × 2¹ ± 25 % jitter    |
/// | 3       | 500 ms × 2² ± 25 % jitter    |
///
/// Delay is capped at 60 s. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ClassifierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifierError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient classifier error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deserialize_err() -> ClassifierError {
        let src = serde_json::from_str::<()>("invalid").unwrap_err();
        ClassifierError::Deserialize {
            context: "test".to_owned(),
            source: src,
        }
    }

    #[test]
    fn invalid_input_is_not_retriable() {
        assert!(!is_retriable(&ClassifierError::InvalidInput {
            reason: "empty text".to_owned()
        }));
    }

    #[test]
    fn deserialize_error_is_not_retriable() {
        assert!(!is_retriable(&deserialize_err()));
    }

    #[test]
    fn timeout_and_unavailable_are_retriable() {
        assert!(is_retriable(&ClassifierError::Timeout));
        assert!(is_retriable(&ClassifierError::Unavailable {
            reason: "503".to_owned()
        }));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ClassifierError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err::<u32, _>(ClassifierError::Timeout)
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "should have been called 3 times (2 failures + 1 success)"
        );
    }

    #[tokio::test]
    async fn does_not_retry_invalid_input() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(3, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ClassifierError::InvalidInput {
                    reason: "bad".to_owned(),
                })
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "InvalidInput must not be retried"
        );
        assert!(matches!(result, Err(ClassifierError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn propagates_last_error_after_exhausting_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(2, 0, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, ClassifierError>(ClassifierError::Timeout)
            }
        })
        .await;
        // max_retries=2 → 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ClassifierError::Timeout)));
    }
}
