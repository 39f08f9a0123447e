use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::SystemError;

/// Runs `task` until it succeeds, returns a non-retriable error, or the
/// policy's retries are exhausted.
///
/// Each attempt is bounded by `policy.timeout_ms`. The delay doubles after every
/// failed attempt, is clamped to `policy.max_delay_ms` and carries up to 10%
/// jitter. `max_retries == 0` retries forever.
pub async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task_name: &str,
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts = 0;
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);

    loop {
        attempts += 1;
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) if !e.is_retriable() => {
                debug!(%task_name, attempts, "non-retriable error: {:?}", e);
                return Err(e);
            }
            Ok(Err(e)) => {
                warn!(%task_name, attempts, "retriable error: {:?}", e);
            }
            Err(_) => {
                warn!(%task_name, attempts, "attempt timed out after {:?}", timeout_duration);
            }
        }

        if policy.max_retries != 0 && attempts > policy.max_retries {
            warn!(%task_name, "giving up after {} attempts", attempts);
            return Err(Error::System(SystemError::RetryExhausted {
                task: task_name.to_string(),
                attempts,
            }));
        }

        sleep(with_jitter(delay)).await;
        delay = (delay * 2).min(max_delay);
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 10;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// Spawns a named background task and tracks its handle
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
