//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap probe calls with a deadline
//! - Cancel the wrapped future cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The wrapped future did not finish within the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// Run `future`, giving up after `limit`.
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimeoutError(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_limit() {
        let value = with_timeout(Duration::from_millis(100), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_times_out() {
        let limit = Duration::from_millis(20);
        let result = with_timeout(limit, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(result, Err(TimeoutError(limit)));
    }
}
