use backon::{ConstantBuilder, ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::RelayError;

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Retry at once. Lowest latency, gives up sooner under transient load.
    Immediate,
    /// Wait `initial_delay`, doubling after each failed attempt.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            strategy: RetryStrategy::Immediate,
            max_attempts,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts,
            initial_delay,
        }
    }

    /// Run `op` until it succeeds, `when` rejects the error, or attempts run out.
    pub async fn run<T, F, Fut, W>(&self, label: &str, op: F, when: W) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
        W: FnMut(&RelayError) -> bool,
    {
        let retries = self.max_attempts.saturating_sub(1);
        let notify = |err: &RelayError, dur: Duration| {
            warn!(
                "{} failed (will retry): {}, sleeping {:?}",
                label, err, dur
            );
        };

        match self.strategy {
            RetryStrategy::Immediate => {
                op.retry(
                    ConstantBuilder::default()
                        .with_delay(Duration::ZERO)
                        .with_max_times(retries),
                )
                .when(when)
                .notify(notify)
                .await
            }
            RetryStrategy::Exponential => {
                op.retry(
                    ExponentialBuilder::default()
                        .with_min_delay(self.initial_delay)
                        .with_factor(2.0)
                        .with_max_times(retries),
                )
                .when(when)
                .notify(notify)
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn flaky(
        calls: Arc<AtomicUsize>,
        failures: usize,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<usize, RelayError>> + Send>>
    {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    Err(RelayError::EventStream(format!("attempt {n} failed")))
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test]
    async fn immediate_policy_retries_up_to_bound() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = RetryPolicy::immediate(3)
            .run("test", flaky(calls.clone(), 2), RelayError::is_retryable)
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_when_attempts_run_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = RetryPolicy::immediate(2)
            .run("test", flaky(calls.clone(), 5), RelayError::is_retryable)
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exponential_policy_counts_attempts_the_same_way() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = RetryPolicy::exponential(3, Duration::from_millis(1))
            .run("test", flaky(calls.clone(), 2), RelayError::is_retryable)
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    fn attempt_times(
        times: Arc<Mutex<Vec<Instant>>>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send>>
    {
        move || {
            let times = times.clone();
            Box::pin(async move {
                times.lock().unwrap().push(Instant::now());
                Err(RelayError::EventStream("unreachable".into()))
            })
        }
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_policy_doubles_the_delay() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let result = RetryPolicy::exponential(3, Duration::from_secs(1))
            .run("test", attempt_times(times.clone()), RelayError::is_retryable)
            .await;
        assert!(result.is_err());

        let gaps = gaps(&times.lock().unwrap());
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_secs(1) && gaps[0] < Duration::from_millis(1100));
        assert!(gaps[1] >= Duration::from_secs(2) && gaps[1] < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_policy_does_not_sleep() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let result = RetryPolicy::immediate(3)
            .run("test", attempt_times(times.clone()), RelayError::is_retryable)
            .await;
        assert!(result.is_err());
        assert_eq!(times.lock().unwrap().len(), 3);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), RelayError> = RetryPolicy::immediate(5)
            .run(
                "test",
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(RelayError::MissingImage) }
                },
                RelayError::is_retryable,
            )
            .await;
        assert!(matches!(result, Err(RelayError::MissingImage)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
