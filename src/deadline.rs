//! Bounded waits on external calls

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with [`Error::Timeout`] once `limit` elapses
pub async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
