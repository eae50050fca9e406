//! Saga compensation coordinator.
//!
//! Runs after a workflow has failed and its policy is not `none`. `full`
//! pops the whole compensation stack, most recent first. `partial` pops only
//! the most recently pushed entry. A failing compensation step does not stop
//! the unwind; the failure is reported once every selected entry has run.

use std::time::Instant;

use sagaflow_types::config::EngineConfig;
use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::execution::StepStatus;
use sagaflow_types::workflow::{CompensationPolicy, StepDefinition, WorkflowDefinition};

use crate::event::bus::EventBus;

use super::context::{CompensationEntry, CompensationRecord, ExecutionContext};
use super::retry::RetryController;
use super::task::{TaskExecutor, TaskInvocation};

/// What an unwind did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationSummary {
    /// Compensation steps that ran successfully.
    pub compensated: usize,
    /// Owning step IDs whose compensation raised.
    pub failed_steps: Vec<String>,
    /// `"<compensation step>: <error>"` per failure.
    pub errors: Vec<String>,
}

impl CompensationSummary {
    pub fn succeeded(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

/// Stateless rollback driver.
pub struct CompensationCoordinator;

impl CompensationCoordinator {
    /// Pop the entries `policy` selects, in the order they must run.
    pub fn select_entries(
        policy: CompensationPolicy,
        ctx: &mut ExecutionContext,
    ) -> Vec<CompensationEntry> {
        match policy {
            CompensationPolicy::Full => std::iter::from_fn(|| ctx.pop_compensation()).collect(),
            CompensationPolicy::Partial => ctx.pop_compensation().into_iter().collect(),
            CompensationPolicy::None => Vec::new(),
        }
    }

    /// Unwind `ctx` according to the definition's compensation policy.
    ///
    /// Publishes `compensation:start`, one `compensation:step` per entry that
    /// runs, then `compensation:complete` or `compensation:failed`.
    pub async fn unwind<E: TaskExecutor>(
        executor: &E,
        events: &EventBus,
        config: &EngineConfig,
        definition: &WorkflowDefinition,
        ctx: &mut ExecutionContext,
    ) -> CompensationSummary {
        let policy = definition.compensation_policy;
        let stack_size = ctx.compensation_stack().len();
        events.publish(WorkflowEvent::CompensationStart { stack_size });
        tracing::info!(%policy, stack_size, "starting compensation");

        let targets = definition.compensation_steps();
        let mut summary = CompensationSummary::default();

        for entry in Self::select_entries(policy, ctx) {
            let target = targets
                .get(entry.compensation_step_id.as_str())
                .copied()
                .or_else(|| definition.find_step(&entry.compensation_step_id))
                .and_then(|step| step.action().map(|(action, inputs)| (step, action, inputs)));
            let Some((target, action, inputs)) = target else {
                tracing::warn!(
                    step_id = %entry.step_id,
                    compensation_step_id = %entry.compensation_step_id,
                    "compensation target not found, nothing to run"
                );
                continue;
            };

            events.publish(WorkflowEvent::CompensationStep {
                step_id: entry.step_id.clone(),
                compensation_step_id: entry.compensation_step_id.clone(),
            });

            let invocation = TaskInvocation {
                step_id: target.step_id.clone(),
                action: action.to_string(),
                inputs: inputs.clone(),
                workflow_inputs: ctx.inputs.clone(),
                attempt: 1,
            };
            let record = Self::run_target(executor, events, config, &entry, target, invocation).await;
            match &record.error {
                None => summary.compensated += 1,
                Some(error) => {
                    tracing::error!(
                        step_id = %entry.step_id,
                        compensation_step_id = %entry.compensation_step_id,
                        error = %error,
                        "compensation step failed"
                    );
                    summary.failed_steps.push(entry.step_id.clone());
                    summary
                        .errors
                        .push(format!("{}: {error}", entry.compensation_step_id));
                }
            }
            ctx.record_compensation(record);
        }

        if summary.succeeded() {
            events.publish(WorkflowEvent::CompensationComplete {
                compensated: summary.compensated,
            });
            tracing::info!(compensated = summary.compensated, "compensation complete");
        } else {
            events.publish(WorkflowEvent::CompensationFailed {
                failed_steps: summary.failed_steps.clone(),
                error: summary.errors.join("; "),
            });
        }

        summary
    }

    async fn run_target<E: TaskExecutor>(
        executor: &E,
        events: &EventBus,
        config: &EngineConfig,
        entry: &CompensationEntry,
        target: &StepDefinition,
        invocation: TaskInvocation,
    ) -> CompensationRecord {
        let started = Instant::now();

        let outcome = RetryController::run(
            &target.step_id,
            config.resolve_retry_policy(target),
            config.max_backoff_ms,
            config.resolve_step_timeout(target),
            events,
            |attempt| {
                let invocation = TaskInvocation {
                    attempt,
                    ..invocation.clone()
                };
                async move { executor.run(&invocation).await }
            },
        )
        .await;

        let (status, error) = match outcome.result {
            Ok(_) => (StepStatus::Completed, None),
            Err(e) => (StepStatus::Failed, Some(e.to_string())),
        };
        CompensationRecord {
            step_id: entry.step_id.clone(),
            compensation_step_id: entry.compensation_step_id.clone(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts: outcome.attempts,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_full_selects_whole_stack_lifo() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.push_compensation("a", "undo-a");
        ctx.push_compensation("b", "undo-b");

        let entries = CompensationCoordinator::select_entries(CompensationPolicy::Full, &mut ctx);
        let ids: Vec<&str> = entries.iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(ctx.compensation_stack().is_empty());
    }

    #[test]
    fn test_partial_selects_last_pushed_only() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.push_compensation("a", "undo-a");
        ctx.push_compensation("b", "undo-b");

        let entries = CompensationCoordinator::select_entries(CompensationPolicy::Partial, &mut ctx);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].step_id, "b");
        assert_eq!(ctx.compensation_stack().len(), 1);
    }

    #[test]
    fn test_none_selects_nothing() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.push_compensation("a", "undo-a");
        assert!(CompensationCoordinator::select_entries(CompensationPolicy::None, &mut ctx).is_empty());
        assert_eq!(ctx.compensation_stack().len(), 1);
    }
}
