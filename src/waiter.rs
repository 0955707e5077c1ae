//! Polling for asynchronous API operations.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WaitState<T> {
    Ready(T),
    Pending,
}

/// Polls `check` every `interval` until it reports [WaitState::Ready], fails,
/// or `timeout` elapses.
pub(crate) async fn wait_for<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WaitState<T>>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if let WaitState::Ready(value) = check().await? {
            debug!("{} ready after {} attempt(s)", what, attempt);
            return Ok(value);
        }

        if started.elapsed() >= timeout {
            warn!("Timed out waiting for {}", what);
            return Err(Error::Timeout {
                what: what.to_string(),
                seconds: timeout.as_secs(),
            });
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_wait_for_ready() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = wait_for(
            "thing",
            Duration::from_secs(5),
            Duration::from_millis(1),
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(WaitState::Pending)
                } else {
                    Ok(WaitState::Ready("done"))
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_timeout() {
        let result: Result<()> = wait_for(
            "thing",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || async { Ok(WaitState::Pending) },
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_wait_for_propagates_errors() {
        let result: Result<()> = wait_for(
            "thing",
            Duration::from_secs(5),
            Duration::from_millis(1),
            || async { Err(Error::MissingId) },
        )
        .await;

        assert!(matches!(result, Err(Error::MissingId)));
    }
}
