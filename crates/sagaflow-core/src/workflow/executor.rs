//! Workflow engine: dependency-driven step scheduling with saga rollback.
//!
//! `WorkflowEngine` walks each step list in document order, running the first
//! step whose dependencies all have results. A parallel or conditional step
//! also waits for whatever its nested steps depend on outside of it, so a
//! nested step may depend on a later step of an enclosing list. Parallel branches run
//! concurrently on a `tokio::JoinSet`; everything else runs one step at a
//! time. All run state lives in one `ExecutionContext` behind a mutex.
//!
//! # Execution flow
//!
//! 1. Publish `workflow:start` and create the `ExecutionContext`.
//! 2. Schedule the top-level steps (bounded by the workflow timeout).
//! 3. Each step: skip checks -> dispatch by type -> record result.
//! 4. On failure, unwind compensations per the workflow's policy.
//! 5. Publish `workflow:complete` or `workflow:failed` and hand back the context.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sagaflow_types::config::EngineConfig;
use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::execution::{ExecutionState, StepResult, StepStatus};
use sagaflow_types::validation::ValidationResult;
use sagaflow_types::workflow::{
    Branch, CompensationPolicy, ConditionalCase, OnFailure, StepDefinition, StepKind, StepType,
    WorkflowDefinition,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::event::bus::{EventBus, drain_journal};

use super::compensation::CompensationCoordinator;
use super::condition::{ConditionEvaluator, TruthyConditions};
use super::context::ExecutionContext;
use super::definition::{WorkflowError, into_definition};
use super::retry::RetryController;
use super::task::{TaskError, TaskExecutor, TaskInvocation};
use super::validator::validate;

/// Reason recorded for steps whose dependencies can never resolve.
pub const UNRESOLVED_DEPENDENCIES: &str = "unresolved dependencies";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a run failed.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("workflow is invalid: {}", .0.summary())]
    Invalid(ValidationResult),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("step '{step_id}' failed after {attempts} attempt(s): {error}")]
    StepFailed {
        step_id: String,
        error: String,
        attempts: u32,
    },

    #[error("step '{step_id}' timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    #[error("parallel step '{step_id}' failed in branches: {}", .failed_branches.join(", "))]
    ParallelFailed {
        step_id: String,
        failed_branches: Vec<String>,
    },

    #[error("workflow timed out after {timeout_ms}ms")]
    WorkflowTimeout { timeout_ms: u64 },

    /// Rollback itself failed. Carries the failure that triggered it.
    #[error("compensation failed for [{}] while handling: {original}", .failed_steps.join(", "))]
    CompensationFailed {
        original: Box<ExecutorError>,
        failed_steps: Vec<String>,
    },

    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },
}

/// A failed run: the error plus the partial context for diagnostics.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: ExecutorError,
    pub context: Box<ExecutionContext>,
}

impl ExecutionFailure {
    fn new(error: ExecutorError, context: ExecutionContext) -> Self {
        Self {
            error,
            context: Box::new(context),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Runs validated workflows against a pluggable `TaskExecutor`.
///
/// [`subscribe`](Self::subscribe) before calling `execute` to follow a run
/// live. The returned `ExecutionContext` carries the complete event journal
/// either way.
pub struct WorkflowEngine<E: TaskExecutor> {
    executor: Arc<E>,
    events: EventBus,
    conditions: Arc<dyn ConditionEvaluator>,
    config: Arc<EngineConfig>,
}

impl<E: TaskExecutor + 'static> WorkflowEngine<E> {
    /// Create an engine with default configuration and `TruthyConditions`.
    pub fn new(executor: E) -> Self {
        let config = EngineConfig::default();
        Self {
            executor: Arc::new(executor),
            events: EventBus::new(config.event_capacity),
            conditions: Arc::new(TruthyConditions),
            config: Arc::new(config),
        }
    }

    /// Replace the condition evaluator.
    pub fn with_condition_evaluator(mut self, evaluator: impl ConditionEvaluator + 'static) -> Self {
        self.conditions = Arc::new(evaluator);
        self
    }

    /// Replace the engine configuration. Recreates the event bus with the
    /// configured capacity, so subscribe afterwards.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.events = EventBus::new(config.event_capacity);
        self.config = Arc::new(config);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Validate an untyped document, then execute it.
    ///
    /// An invalid document fails without running anything or publishing any
    /// event; the returned context is already in the `failed` state.
    pub async fn execute_document(
        &self,
        document: &Value,
        inputs: Value,
    ) -> Result<ExecutionContext, ExecutionFailure> {
        let workflow_id = document
            .get("workflowId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let validation = validate(document);
        if !validation.valid {
            tracing::warn!(%workflow_id, errors = validation.errors.len(), "refusing to run invalid workflow");
            return Err(Self::rejected(ExecutorError::Invalid(validation), workflow_id, inputs));
        }

        let definition = match into_definition(document) {
            Ok(definition) => definition,
            Err(e) => return Err(Self::rejected(e.into(), workflow_id, inputs)),
        };
        self.execute(&definition, inputs).await
    }

    fn rejected(error: ExecutorError, workflow_id: String, inputs: Value) -> ExecutionFailure {
        let mut context = ExecutionContext::new(workflow_id, inputs);
        // running -> failed is always allowed.
        let _ = context.transition(ExecutionState::Failed);
        ExecutionFailure::new(error, context)
    }

    /// Execute a typed definition to completion.
    ///
    /// Returns the final context on success. On failure, compensation (if
    /// the policy allows) has already run and the partial context is carried
    /// in the `ExecutionFailure`.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        inputs: Value,
    ) -> Result<ExecutionContext, ExecutionFailure> {
        let context = ExecutionContext::new(definition.workflow_id.clone(), inputs.clone());
        let span = tracing::info_span!(
            "workflow",
            workflow_id = %definition.workflow_id,
            run_id = %context.run_id
        );
        self.drive(definition, inputs, context).instrument(span).await
    }

    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        inputs: Value,
        context: ExecutionContext,
    ) -> Result<ExecutionContext, ExecutionFailure> {
        let (events, mut journal) = self.events.recording();
        tracing::info!(
            name = %definition.name,
            version = %definition.version,
            steps = definition.steps.len(),
            "workflow started"
        );
        events.publish(WorkflowEvent::WorkflowStart {
            workflow_id: definition.workflow_id.clone(),
            name: definition.name.clone(),
            version: definition.version.clone(),
            run_id: context.run_id.to_string(),
        });

        let run = Arc::new(Run {
            executor: Arc::clone(&self.executor),
            events: events.clone(),
            conditions: Arc::clone(&self.conditions),
            config: Arc::clone(&self.config),
            inputs,
            context: Mutex::new(context),
        });

        let scheduled = run_step_list(Arc::clone(&run), definition.steps.clone());
        let outcome = match definition.timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), scheduled).await {
                    Ok(result) => result,
                    Err(_) => Err(ExecutorError::WorkflowTimeout { timeout_ms }),
                }
            }
            None => scheduled.await,
        };

        let mut ctx = run.context.lock().await.clone();
        let result = self.finish(definition, &events, &mut ctx, outcome).await;
        ctx.append_events(drain_journal(&mut journal));
        match result {
            Ok(()) => Ok(ctx),
            Err(error) => Err(ExecutionFailure::new(error, ctx)),
        }
    }

    /// Settle the final state, compensating first when the run failed.
    async fn finish(
        &self,
        definition: &WorkflowDefinition,
        events: &EventBus,
        ctx: &mut ExecutionContext,
        outcome: Result<(), ExecutorError>,
    ) -> Result<(), ExecutorError> {
        match outcome {
            Ok(()) => {
                ctx.transition(ExecutionState::Completed)?;
                let duration_ms = ctx.elapsed_ms();
                let steps_executed = ctx.steps_executed();
                tracing::info!(duration_ms, steps_executed, "workflow completed");
                events.publish(WorkflowEvent::WorkflowComplete {
                    workflow_id: definition.workflow_id.clone(),
                    duration_ms,
                    steps_executed,
                });
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "workflow failed");
                let error = self.compensate(definition, events, ctx, error).await;
                ctx.transition(ExecutionState::Failed)?;
                events.publish(WorkflowEvent::WorkflowFailed {
                    workflow_id: definition.workflow_id.clone(),
                    error: error.to_string(),
                    duration_ms: ctx.elapsed_ms(),
                });
                Err(error)
            }
        }
    }

    /// Run the compensation coordinator when the policy allows it. Returns
    /// the error the run should fail with.
    async fn compensate(
        &self,
        definition: &WorkflowDefinition,
        events: &EventBus,
        ctx: &mut ExecutionContext,
        error: ExecutorError,
    ) -> ExecutorError {
        if definition.compensation_policy == CompensationPolicy::None {
            return error;
        }
        if let Err(e) = ctx.transition(ExecutionState::Compensating) {
            return e;
        }

        let span = tracing::info_span!("compensation", policy = %definition.compensation_policy);
        let summary = CompensationCoordinator::unwind(
            self.executor.as_ref(),
            events,
            &self.config,
            definition,
            ctx,
        )
        .instrument(span)
        .await;

        if summary.succeeded() {
            if let Err(e) = ctx.transition(ExecutionState::Compensated) {
                return e;
            }
            error
        } else {
            ExecutorError::CompensationFailed {
                original: Box::new(error),
                failed_steps: summary.failed_steps,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Shared state of one run. Branch tasks hold it through an `Arc`.
struct Run<E> {
    executor: Arc<E>,
    events: EventBus,
    conditions: Arc<dyn ConditionEvaluator>,
    config: Arc<EngineConfig>,
    inputs: Value,
    context: Mutex<ExecutionContext>,
}

type StepListFuture = Pin<Box<dyn Future<Output = Result<(), ExecutorError>> + Send>>;

/// Schedule one step list until every step has a result or one escalates.
///
/// Boxed so parallel branches and conditional cases can recurse into it.
fn run_step_list<E: TaskExecutor + 'static>(
    run: Arc<Run<E>>,
    steps: Vec<StepDefinition>,
) -> StepListFuture {
    Box::pin(async move {
        let mut pending: Vec<StepDefinition> = steps
            .into_iter()
            .filter(|s| s.step_type() != StepType::Compensation)
            .collect();

        while !pending.is_empty() {
            let eligible = {
                let ctx = run.context.lock().await;
                pending
                    .iter()
                    .position(|s| s.external_dependencies().iter().all(|dep| ctx.has_result(dep)))
            };

            let Some(idx) = eligible else {
                for step in pending.drain(..) {
                    run.skip(&step.step_id, UNRESOLVED_DEPENDENCIES.to_string()).await;
                }
                break;
            };

            let step = pending.remove(idx);
            let span = tracing::info_span!(
                "step",
                step_id = %step.step_id,
                step_type = %step.step_type()
            );
            run_step(&run, &step).instrument(span).await?;
        }
        Ok(())
    })
}

async fn run_step<E: TaskExecutor + 'static>(
    run: &Arc<Run<E>>,
    step: &StepDefinition,
) -> Result<(), ExecutorError> {
    if let Some(reason) = run.skip_reason(step).await {
        run.skip(&step.step_id, reason).await;
        return Ok(());
    }

    match &step.kind {
        StepKind::Task { action, inputs } => run.run_task(step, action, inputs).await,
        StepKind::Parallel { branches } => run_parallel(run, step, branches).await,
        StepKind::Conditional { cases, default } => {
            run_conditional(run, step, cases, default.as_deref()).await
        }
        // Only reachable through compensation.
        StepKind::Compensation { .. } => Ok(()),
    }
}

async fn run_parallel<E: TaskExecutor + 'static>(
    run: &Arc<Run<E>>,
    step: &StepDefinition,
    branches: &[Branch],
) -> Result<(), ExecutorError> {
    run.events.publish(WorkflowEvent::ParallelStart {
        step_id: step.step_id.clone(),
        branches: branches.len(),
    });
    let started = Instant::now();

    let mut join_set = JoinSet::new();
    for (idx, branch) in branches.iter().enumerate() {
        let branch_run = run_step_list(Arc::clone(run), branch.steps.clone());
        join_set.spawn(async move { (idx, branch_run.await) });
    }

    // Every branch settles before the aggregate result.
    let mut outcomes: Vec<Option<Result<(), ExecutorError>>> =
        branches.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, result)) => outcomes[idx] = Some(result),
            Err(e) => tracing::error!(error = %e, "parallel branch task aborted"),
        }
    }

    let failures: Vec<(String, String)> = branches
        .iter()
        .zip(outcomes)
        .filter_map(|(branch, outcome)| match outcome {
            Some(Ok(())) => None,
            Some(Err(e)) => Some((branch.branch_id.clone(), e.to_string())),
            None => Some((branch.branch_id.clone(), "branch task panicked".to_string())),
        })
        .collect();
    let duration_ms = started.elapsed().as_millis() as u64;

    if failures.is_empty() {
        run.complete_composite(step, duration_ms).await;
        run.events.publish(WorkflowEvent::ParallelComplete {
            step_id: step.step_id.clone(),
            duration_ms,
        });
        tracing::info!(duration_ms, "parallel step completed");
        return Ok(());
    }

    let failed_branches: Vec<String> = failures.iter().map(|(id, _)| id.clone()).collect();
    let error = failures
        .iter()
        .map(|(id, e)| format!("{id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    tracing::error!(failed_branches = ?failed_branches, "parallel step failed");
    run.context.lock().await.record(StepResult::failed(
        &step.step_id,
        error.clone(),
        duration_ms,
        0,
    ));
    run.events.publish(WorkflowEvent::ParallelFailed {
        step_id: step.step_id.clone(),
        failed_branches: failed_branches.clone(),
        error,
        duration_ms,
    });
    Err(ExecutorError::ParallelFailed {
        step_id: step.step_id.clone(),
        failed_branches,
    })
}

async fn run_conditional<E: TaskExecutor + 'static>(
    run: &Arc<Run<E>>,
    step: &StepDefinition,
    cases: &[ConditionalCase],
    default: Option<&[StepDefinition]>,
) -> Result<(), ExecutorError> {
    let matched = cases
        .iter()
        .position(|case| run.conditions.evaluate(&step.step_id, &case.condition, &run.inputs));

    let selected = match matched {
        Some(case_index) => {
            tracing::debug!(case_index, "conditional case matched");
            run.events.publish(WorkflowEvent::ConditionalMatched {
                step_id: step.step_id.clone(),
                case_index,
            });
            Some(cases[case_index].steps.as_slice())
        }
        None => {
            if default.is_some() {
                run.events.publish(WorkflowEvent::ConditionalDefault {
                    step_id: step.step_id.clone(),
                });
            } else {
                tracing::debug!("no case matched and no default, nothing to run");
            }
            default
        }
    };

    let started = Instant::now();
    let result = match selected {
        Some(steps) => run_step_list(Arc::clone(run), steps.to_vec()).await,
        None => Ok(()),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => {
            run.complete_composite(step, duration_ms).await;
            Ok(())
        }
        Err(e) => {
            run.context.lock().await.record(StepResult::failed(
                &step.step_id,
                e.to_string(),
                duration_ms,
                0,
            ));
            Err(e)
        }
    }
}

impl<E: TaskExecutor + 'static> Run<E> {
    /// Why `step` must be skipped, if it must.
    async fn skip_reason(&self, step: &StepDefinition) -> Option<String> {
        {
            let ctx = self.context.lock().await;
            let skipped_dep = step.depends_on.iter().find(|dep| {
                ctx.result(dep)
                    .is_some_and(|r| r.status == StepStatus::Skipped)
            });
            if let Some(dep) = skipped_dep {
                return Some(format!("dependency '{dep}' was skipped"));
            }
        }

        match &step.condition {
            Some(condition) if !self.conditions.evaluate(&step.step_id, condition, &self.inputs) => {
                Some("condition evaluated to false".to_string())
            }
            _ => None,
        }
    }

    async fn skip(&self, step_id: &str, reason: String) {
        tracing::info!(step_id, reason = %reason, "step skipped");
        self.context
            .lock()
            .await
            .record(StepResult::skipped(step_id, reason.clone()));
        self.events.publish(WorkflowEvent::StepSkipped {
            step_id: step_id.to_string(),
            reason,
        });
    }

    /// Record a completed parallel or conditional step and register its
    /// compensation.
    async fn complete_composite(&self, step: &StepDefinition, duration_ms: u64) {
        let mut ctx = self.context.lock().await;
        if ctx.record(StepResult::completed(&step.step_id, Value::Null, duration_ms, 0)) {
            if let Some(compensation) = &step.compensation {
                ctx.push_compensation(&step.step_id, compensation);
            }
        }
    }

    async fn run_task(
        &self,
        step: &StepDefinition,
        action: &str,
        inputs: &Value,
    ) -> Result<(), ExecutorError> {
        self.events.publish(WorkflowEvent::StepStart {
            step_id: step.step_id.clone(),
            step_type: StepType::Task.as_str().to_string(),
        });
        let started = Instant::now();

        let outcome = RetryController::run(
            &step.step_id,
            self.config.resolve_retry_policy(step),
            self.config.max_backoff_ms,
            self.config.resolve_step_timeout(step),
            &self.events,
            |attempt| {
                let invocation = TaskInvocation {
                    step_id: step.step_id.clone(),
                    action: action.to_string(),
                    inputs: inputs.clone(),
                    workflow_inputs: self.inputs.clone(),
                    attempt,
                };
                let executor = Arc::clone(&self.executor);
                async move { executor.run(&invocation).await }
            },
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let attempts = outcome.attempts;

        match outcome.result {
            Ok(output) => {
                {
                    let mut ctx = self.context.lock().await;
                    if ctx.record(StepResult::completed(&step.step_id, output, duration_ms, attempts)) {
                        if let Some(compensation) = &step.compensation {
                            ctx.push_compensation(&step.step_id, compensation);
                        }
                    }
                }
                tracing::info!(duration_ms, attempts, "step completed");
                self.events.publish(WorkflowEvent::StepComplete {
                    step_id: step.step_id.clone(),
                    duration_ms,
                    attempts,
                });
                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                self.context.lock().await.record(StepResult::failed(
                    &step.step_id,
                    message.clone(),
                    duration_ms,
                    attempts,
                ));
                self.events.publish(WorkflowEvent::StepFailed {
                    step_id: step.step_id.clone(),
                    error: message.clone(),
                    duration_ms,
                });

                if step.on_failure == OnFailure::Continue {
                    tracing::warn!(error = %message, attempts, "step failed, continuing");
                    return Ok(());
                }
                tracing::error!(error = %message, attempts, "step failed");
                Err(match error {
                    TaskError::Timeout(timeout_ms) => ExecutorError::StepTimeout {
                        step_id: step.step_id.clone(),
                        timeout_ms,
                    },
                    other => ExecutorError::StepFailed {
                        step_id: step.step_id.clone(),
                        error: other.to_string(),
                        attempts,
                    },
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
