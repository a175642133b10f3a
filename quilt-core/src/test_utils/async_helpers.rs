//! Async test helpers

use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut;

impl std::fmt::Display for TimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "condition not met before timeout")
    }
}

impl std::error::Error for TimedOut {}

/// Poll `condition` every `interval` until it holds or `limit` passes
pub async fn wait_until<F>(limit: Duration, interval: Duration, mut condition: F) -> Result<(), TimedOut>
where
    F: FnMut() -> bool,
{
    timeout(limit, async {
        while !condition() {
            sleep(interval).await;
        }
    })
    .await
    .map_err(|_| TimedOut)
}

/// Run a future with a timeout, panicking if it expires
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("operation timed out after {duration:?}"),
    }
}
