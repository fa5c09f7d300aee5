use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("gave up after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Probe every `interval` until it yields a value. The first probe runs
/// immediately. Probe errors are logged and count as "not yet". `timeout` of
/// `None` waits until cancelled. Cancellation and the deadline also cut a
/// probe that is still in flight.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
    let timed_out = WaitError::TimedOut(timeout.unwrap_or_default());
    let mut attempts = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        attempts += 1;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = sleep_until(deadline) => return Err(timed_out),
            outcome = probe() => outcome,
        };
        match outcome {
            Ok(Some(value)) => {
                tracing::debug!(attempts, "wait condition met");
                return Ok(value);
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(attempts, ?err, "wait probe failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = sleep_until(deadline) => return Err(timed_out),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
