//! Retry controller — exponential backoff on rate-limited provider calls.
//!
//! Only throttling errors are retried here. Other transient failures (5xx)
//! are the provider implementation's own concern; they propagate from this
//! controller immediately.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::ProviderError;
use crate::progress::JobTracker;

/// Wraps provider calls in rate-limit-aware retry, logging each backoff
/// wait to the associated job (when there is one).
pub struct RetryController {
    policy: RetryPolicy,
    tracker: Arc<JobTracker>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, tracker: Arc<JobTracker>) -> Self {
        Self { policy, tracker }
    }

    /// Invoke `op`, retrying with exponential backoff while it fails with a
    /// rate-limit-classified error and attempts remain. Non-rate-limit
    /// errors propagate immediately; after `max_attempts` rate-limited
    /// failures the last error propagates.
    pub async fn run<T, F, Fut>(&self, job: Option<Uuid>, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() && attempt < self.policy.max_attempts => {
                    // A Retry-After hint from the provider overrides the
                    // scheduled delay for this wait.
                    let wait = err.retry_after().unwrap_or(delay);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_secs = wait.as_secs(),
                        error = %err,
                        "Provider rate limited; backing off"
                    );
                    if let Some(job_id) = job {
                        self.tracker
                            .log(
                                job_id,
                                format!(
                                    "Rate limited by provider, waiting {}s before retry {}/{}",
                                    wait.as_secs(),
                                    attempt + 1,
                                    self.policy.max_attempts
                                ),
                            )
                            .await;
                    }
                    tokio::time::sleep(wait).await;
                    delay *= self.policy.backoff_factor;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn controller(max_attempts: u32) -> RetryController {
        RetryController::new(
            RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_secs(20),
                backoff_factor: 2,
            },
            JobTracker::new(),
        )
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited {
            message: "429".into(),
            retry_after: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = controller(5)
            .run(None, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProviderError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_retries_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = controller(5)
            .run(None, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_double() {
        let start = Instant::now();
        let _: Result<(), _> = controller(3)
            .run(None, || async { Err(rate_limited()) })
            .await;

        // 20s + 40s between the three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_scheduled_delay() {
        let start = Instant::now();
        let _: Result<(), _> = controller(2)
            .run(None, || async {
                Err(ProviderError::RateLimited {
                    message: "429".into(),
                    retry_after: Some(Duration::from_secs(5)),
                })
            })
            .await;

        // One wait between the two attempts, at the hinted 5s instead of
        // the policy's 20s.
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = controller(5)
            .run(None, || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Api {
                        status: 500,
                        message: "boom".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Api { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eventual_success_after_throttling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = controller(5)
            .run(None, || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("sent")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_waits_are_logged_to_job() {
        let tracker = JobTracker::new();
        let controller = RetryController::new(
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_secs(20),
                backoff_factor: 2,
            },
            Arc::clone(&tracker),
        );
        let job_id = tracker.create().await;

        let _: Result<(), _> = controller
            .run(Some(job_id), || async { Err(rate_limited()) })
            .await;

        let job = tracker.snapshot(job_id).await.unwrap();
        assert_eq!(job.logs.len(), 1);
        assert!(job.logs[0].message.contains("waiting 20s"));
        assert!(job.logs[0].message.contains("retry 2/2"));
    }
}
