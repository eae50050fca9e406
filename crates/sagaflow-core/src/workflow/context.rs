//! Per-run execution state.
//!
//! `ExecutionContext` is created when a run starts and handed back to the
//! caller on success or failure. Step results are append-only: the first
//! result recorded for a step ID is kept for the rest of the run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::execution::{ExecutionState, StepResult, StepStatus};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::executor::ExecutorError;

// ---------------------------------------------------------------------------
// Compensation bookkeeping
// ---------------------------------------------------------------------------

/// A completed step whose effects can be undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationEntry {
    /// The step that completed.
    pub step_id: String,
    /// The `compensation` step that undoes it.
    pub compensation_step_id: String,
}

/// Outcome of one compensation step run during rollback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRecord {
    pub step_id: String,
    pub compensation_step_id: String,
    pub status: StepStatus,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Mutable run-state for one execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    state: ExecutionState,
    /// Every state the run has been in, oldest first.
    state_history: Vec<ExecutionState>,
    /// In completion order.
    step_results: Vec<StepResult>,
    #[serde(skip)]
    result_index: HashMap<String, usize>,
    compensation_stack: Vec<CompensationEntry>,
    compensations: Vec<CompensationRecord>,
    /// Every lifecycle event of the run, in publish order.
    events: Vec<WorkflowEvent>,
    pub inputs: Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    /// Start a new run in the `running` state with a fresh v7 run ID.
    pub fn new(workflow_id: impl Into<String>, inputs: Value) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            workflow_id: workflow_id.into(),
            state: ExecutionState::Running,
            state_history: vec![ExecutionState::Running],
            step_results: Vec::new(),
            result_index: HashMap::new(),
            compensation_stack: Vec::new(),
            compensations: Vec::new(),
            events: Vec::new(),
            inputs,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn state_history(&self) -> &[ExecutionState] {
        &self.state_history
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: ExecutionState) -> Result<(), ExecutorError> {
        if !self.state.can_transition_to(next) {
            return Err(ExecutorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(run_id = %self.run_id, from = %self.state, to = %next, "execution state change");
        self.state = next;
        self.state_history.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Append a step result. Returns `false` (and keeps the earlier result)
    /// if the step already has one.
    pub fn record(&mut self, result: StepResult) -> bool {
        if self.result_index.contains_key(&result.step_id) {
            tracing::warn!(
                step_id = %result.step_id,
                "step already has a result, keeping the first one"
            );
            return false;
        }
        self.result_index
            .insert(result.step_id.clone(), self.step_results.len());
        self.step_results.push(result);
        true
    }

    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.result_index
            .get(step_id)
            .and_then(|idx| self.step_results.get(*idx))
    }

    pub fn has_result(&self, step_id: &str) -> bool {
        self.result_index.contains_key(step_id)
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn push_compensation(&mut self, step_id: impl Into<String>, compensation_step_id: impl Into<String>) {
        self.compensation_stack.push(CompensationEntry {
            step_id: step_id.into(),
            compensation_step_id: compensation_step_id.into(),
        });
    }

    pub fn pop_compensation(&mut self) -> Option<CompensationEntry> {
        self.compensation_stack.pop()
    }

    pub fn compensation_stack(&self) -> &[CompensationEntry] {
        &self.compensation_stack
    }

    pub fn record_compensation(&mut self, record: CompensationRecord) {
        self.compensations.push(record);
    }

    pub fn compensations(&self) -> &[CompensationRecord] {
        &self.compensations
    }

    pub(crate) fn append_events(&mut self, events: impl IntoIterator<Item = WorkflowEvent>) {
        self.events.extend(events);
    }

    /// The complete event journal of the run. Unlike a bus subscription this
    /// never lags.
    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    /// Milliseconds since the run started, frozen once it finishes.
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Steps that actually ran (completed or failed, not skipped).
    pub fn steps_executed(&self) -> usize {
        self.step_results
            .iter()
            .filter(|r| r.status != StepStatus::Skipped)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context_is_running() {
        let ctx = ExecutionContext::new("wf", json!({"k": 1}));
        assert_eq!(ctx.state(), ExecutionState::Running);
        assert_eq!(ctx.state_history(), &[ExecutionState::Running]);
        assert_eq!(ctx.run_id.get_version_num(), 7);
        assert!(ctx.finished_at.is_none());
    }

    #[test]
    fn test_transition_rules_enforced() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.transition(ExecutionState::Compensating).unwrap();
        ctx.transition(ExecutionState::Compensated).unwrap();
        ctx.transition(ExecutionState::Failed).unwrap();
        assert!(ctx.finished_at.is_some());

        let err = ctx.transition(ExecutionState::Running).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTransition { .. }));
        assert_eq!(ctx.state_history().len(), 4);
    }

    #[test]
    fn test_first_result_wins() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        assert!(ctx.record(StepResult::completed("a", json!(1), 5, 1)));
        assert!(!ctx.record(StepResult::failed("a", "boom", 5, 1)));

        assert_eq!(ctx.step_results().len(), 1);
        assert_eq!(ctx.result("a").unwrap().status, StepStatus::Completed);
        assert!(ctx.has_result("a"));
        assert!(!ctx.has_result("b"));
    }

    #[test]
    fn test_steps_executed_ignores_skipped() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.record(StepResult::completed("a", Value::Null, 1, 1));
        ctx.record(StepResult::failed("b", "x", 1, 2));
        ctx.record(StepResult::skipped("c", "condition evaluated to false"));
        assert_eq!(ctx.steps_executed(), 2);
    }

    #[test]
    fn test_compensation_stack_is_lifo() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.push_compensation("a", "undo-a");
        ctx.push_compensation("b", "undo-b");
        assert_eq!(ctx.compensation_stack().len(), 2);
        assert_eq!(ctx.pop_compensation().unwrap().step_id, "b");
        assert_eq!(ctx.pop_compensation().unwrap().step_id, "a");
        assert!(ctx.pop_compensation().is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut ctx = ExecutionContext::new("wf", Value::Null);
        ctx.record(StepResult::completed("a", Value::Null, 1, 1));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["workflowId"], "wf");
        assert_eq!(json["state"], "running");
        assert_eq!(json["stepResults"][0]["stepId"], "a");
        assert!(json.get("resultIndex").is_none());
    }
}
