//! Timeout enforcement.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

/// Run `fut` under `limit`, mapping expiry to [`TransportError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64)),
    }
}
