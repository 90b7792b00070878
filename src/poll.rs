//! Bounded polling of remote generation tasks

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::error::AdapterError;

/// How often and how long to poll one task
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Polls before giving up with [`AdapterError::Timeout`]
    pub max_attempts: u32,
    /// Retries of a single poll request that failed transiently
    pub retry_times: usize,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
}

impl PollPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: 200,
            retry_times: 4,
            retry_min_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_delay(self.retry_max_delay)
            .with_max_times(self.retry_times)
    }
}

/// What one poll response means for the loop
#[derive(Debug, PartialEq)]
pub enum PollStep<R> {
    Pending,
    Done(R),
    Failed(String),
}

/// Sleep `interval`, fetch, and let `on_status` decide, until done.
///
/// Transient fetch errors are retried with exponential backoff; anything
/// else, a failed task, or running out of attempts ends the loop with an
/// error.
pub async fn poll_task<T, R, F, Fut, S>(
    policy: &PollPolicy,
    mut fetch: F,
    mut on_status: S,
) -> Result<R, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
    S: FnMut(T) -> PollStep<R>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let status = (&mut fetch)
            .retry(policy.backoff())
            .sleep(tokio::time::sleep)
            .when(AdapterError::is_transient)
            .notify(|err: &AdapterError, delay: Duration| {
                log::warn!("Poll attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
            })
            .await?;

        match on_status(status) {
            PollStep::Pending => continue,
            PollStep::Done(result) => return Ok(result),
            PollStep::Failed(reason) => return Err(AdapterError::TaskFailed(reason)),
        }
    }
    Err(AdapterError::Timeout {
        attempts: policy.max_attempts,
    })
}
