//! Bounded retry with exponential backoff.
//!
//! Stateless, like the rest of the step helpers: configuration is passed in
//! on every call. Only the last attempt's error is surfaced; earlier failures
//! are visible through `step:retry` events.

use std::future::Future;
use std::time::Duration;

use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::workflow::RetryPolicy;
use serde_json::Value;

use crate::event::bus::EventBus;

use super::task::TaskError;

// ---------------------------------------------------------------------------
// RetryOutcome
// ---------------------------------------------------------------------------

/// Final result of a retried unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    /// Output of the successful attempt, or the last attempt's error.
    pub result: Result<Value, TaskError>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// RetryController
// ---------------------------------------------------------------------------

/// Stateless retry controller for task and compensation steps.
pub struct RetryController;

impl RetryController {
    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < policy.max_attempts.max(1)
    }

    /// Wait before the attempt following `attempt`, capped at `max_backoff_ms`.
    pub fn backoff_delay(policy: &RetryPolicy, attempt: u32, max_backoff_ms: u64) -> u64 {
        policy.backoff_for(attempt).min(max_backoff_ms)
    }

    /// Run `attempt_fn` until it succeeds or the policy is exhausted.
    ///
    /// Each attempt is bounded by `timeout_ms` when set; a timed-out attempt
    /// counts as a failure like any other. A `step:retry` event is published
    /// for every failed attempt that will be retried.
    pub async fn run<F, Fut>(
        step_id: &str,
        policy: &RetryPolicy,
        max_backoff_ms: u64,
        timeout_ms: Option<u64>,
        events: &EventBus,
        mut attempt_fn: F,
    ) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Value, TaskError>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match timeout_ms {
                Some(ms) => {
                    match tokio::time::timeout(Duration::from_millis(ms), attempt_fn(attempt)).await {
                        Ok(result) => result,
                        Err(_) => Err(TaskError::Timeout(ms)),
                    }
                }
                None => attempt_fn(attempt).await,
            };

            let error = match result {
                Ok(output) => {
                    return RetryOutcome {
                        result: Ok(output),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if !Self::should_retry(policy, attempt) {
                tracing::debug!(step_id, attempt, error = %error, "retries exhausted");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }

            let backoff_ms = Self::backoff_delay(policy, attempt, max_backoff_ms);
            tracing::warn!(
                step_id,
                attempt,
                max_attempts,
                backoff_ms,
                error = %error,
                "step attempt failed, retrying"
            );
            events.publish(WorkflowEvent::StepRetry {
                step_id: step_id.to_string(),
                attempt,
                max_attempts,
                backoff_ms,
                error: error.to_string(),
            });

            if backoff_ms > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            attempt += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::bus::drain_journal;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_ms: 1,
            backoff_multiplier: 2.0,
        }
    }

    fn retry_events(events: &[WorkflowEvent]) -> Vec<(u32, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StepRetry { attempt, backoff_ms, .. } => Some((*attempt, *backoff_ms)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_should_retry() {
        let p = policy(3);
        assert!(RetryController::should_retry(&p, 1));
        assert!(RetryController::should_retry(&p, 2));
        assert!(!RetryController::should_retry(&p, 3));
        assert!(!RetryController::should_retry(&policy(0), 1));
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let p = RetryPolicy {
            max_attempts: 10,
            backoff_ms: 1000,
            backoff_multiplier: 3.0,
        };
        assert_eq!(RetryController::backoff_delay(&p, 1, 60_000), 1000);
        assert_eq!(RetryController::backoff_delay(&p, 3, 60_000), 9000);
        assert_eq!(RetryController::backoff_delay(&p, 8, 60_000), 60_000);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let (bus, mut journal) = EventBus::new(16).recording();

        let outcome = RetryController::run("s", &policy(2), 60_000, None, &bus, |attempt| async move {
            Err(TaskError::Failed(format!("failure {attempt}")))
        })
        .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result, Err(TaskError::Failed("failure 2".to_string())));
        assert_eq!(retry_events(&drain_journal(&mut journal)), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let (bus, mut journal) = EventBus::new(16).recording();
        let calls = AtomicU32::new(0);

        let outcome = RetryController::run("s", &policy(3), 60_000, None, &bus, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(TaskError::Failed("flaky".to_string()))
                } else {
                    Ok(Value::from(n))
                }
            }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Ok(Value::from(3)));
        assert_eq!(retry_events(&drain_journal(&mut journal)), vec![(1, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let bus = EventBus::new(16);

        let outcome = RetryController::run("s", &policy(1), 60_000, Some(10), &bus, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result, Err(TaskError::Timeout(10)));
    }
}
