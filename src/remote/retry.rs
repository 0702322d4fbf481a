//! Retry classification and the single-retry helper.
//!
//! Every retried call gets exactly one more attempt after a fixed backoff.
//! A second failure is final for that item.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::RemoteError;

/// Substrings of transport error descriptions that indicate a transient failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection reset",
];

/// Whether another attempt at the failed call is worthwhile.
///
/// Retries rate limiting (429), server-side failures (5xx), and timeouts or
/// connection resets. Everything else (not found, bad request, auth) is final.
pub fn is_retryable(err: &RemoteError) -> bool {
    match err {
        RemoteError::Status { code, .. } => *code == 429 || *code >= 500,
        RemoteError::Timeout => true,
        RemoteError::Transport(description) => {
            let lower = description.to_lowercase();
            TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
        }
        RemoteError::Malformed(_) => false,
    }
}

/// Run `op`, and once more after `backoff` if the first failure is retryable.
///
/// `what` names the call in log output.
pub async fn with_one_retry<T, F, Fut>(
    what: &str,
    backoff: Duration,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) if is_retryable(&e) => {
            debug!(call = what, error = %e, backoff = ?backoff, "Retrying after transient error");
            tokio::time::sleep(backoff).await;
            op().await
        }
        Err(e) => Err(e),
    }
}

/// Run `fut` with a deadline, mapping expiry to [`RemoteError::Timeout`].
pub async fn with_timeout<T, Fut>(limit: Duration, fut: Fut) -> Result<T, RemoteError>
where
    Fut: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(RemoteError::Timeout),
    }
}
