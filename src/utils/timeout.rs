//! Deadline helper for connect calls

use std::time::Duration;

/// Apply an optional deadline to a fallible future.
///
/// A `timeout` of `None` waits for as long as the future takes.
pub async fn with_timeout<T, E>(
    timeout: Option<Duration>,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    let Some(limit) = timeout else {
        return future.await.map_err(TimeoutError::Inner);
    };

    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(limit)),
    }
}

/// Interpret a millisecond setting where 0 means "no deadline"
pub fn deadline_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}
