//! Retry logic with exponential backoff for SAT service calls.
//!
//! Retries only on transient transport errors (connection failures,
//! timeouts). Everything else, including HTTP error statuses, SOAP faults
//! and business rejections, is returned immediately without retry.
//! Cancellation also interrupts the wait between attempts.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::TransportError;

/// Run `f` with exponential backoff retry on transient transport errors.
///
/// The closure is called up to `policy.max_retries + 1` times. Delays
/// double from `policy.base_delay` (200ms → 400ms → 800ms by default).
pub(crate) async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    f: F,
) -> Result<T, TransportError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    for attempt in 0..policy.max_retries {
        match f().await {
            Err(e) if e.is_transient() => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    "SAT service call failed, retrying in {delay:?}: {e}"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(TransportError::Cancelled {
                            endpoint: "retry".into(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            other => return other,
        }
    }
    // Final attempt, no more retries.
    f().await
}
