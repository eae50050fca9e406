//! Execution tracking types: workflow run state and per-step results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Execution State
// ---------------------------------------------------------------------------

/// Workflow-level state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl ExecutionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `running -> completed | failed | compensating`,
    /// `compensating -> compensated | failed`, `compensated -> failed`.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Running, Completed)
                | (Running, Failed)
                | (Running, Compensating)
                | (Compensating, Compensated)
                | (Compensating, Failed)
                | (Compensated, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Running => write!(f, "running"),
            ExecutionState::Completed => write!(f, "completed"),
            ExecutionState::Failed => write!(f, "failed"),
            ExecutionState::Compensating => write!(f, "compensating"),
            ExecutionState::Compensated => write!(f, "compensated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Step Result
// ---------------------------------------------------------------------------

/// Terminal status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// The recorded outcome of one step. Never mutated once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    /// Opaque output of the unit of work (null for skipped or failed steps).
    #[serde(default)]
    pub output: Value,
    /// Wall-clock duration in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Present iff `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the step was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Unit-of-work attempts made (0 for skipped and composite steps).
    #[serde(default)]
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn completed(step_id: impl Into<String>, output: Value, duration_ms: u64, attempts: u32) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Completed,
            output,
            duration_ms,
            error: None,
            reason: None,
            attempts,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            output: Value::Null,
            duration_ms,
            error: Some(error.into()),
            reason: None,
            attempts,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: Value::Null,
            duration_ms: 0,
            error: None,
            reason: Some(reason.into()),
            attempts: 0,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(ExecutionState::Running.can_transition_to(ExecutionState::Completed));
        assert!(ExecutionState::Running.can_transition_to(ExecutionState::Compensating));
        assert!(ExecutionState::Compensating.can_transition_to(ExecutionState::Compensated));
        assert!(ExecutionState::Compensated.can_transition_to(ExecutionState::Failed));
        assert!(!ExecutionState::Completed.can_transition_to(ExecutionState::Running));
        assert!(!ExecutionState::Failed.can_transition_to(ExecutionState::Compensating));
        assert!(!ExecutionState::Running.can_transition_to(ExecutionState::Compensated));
    }

    #[test]
    fn test_failed_result_carries_error() {
        let r = StepResult::failed("a", "boom", 12, 2);
        assert_eq!(r.status, StepStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert_eq!(r.attempts, 2);

        let r = StepResult::completed("b", serde_json::json!({"ok": true}), 3, 1);
        assert!(r.error.is_none());
    }

    #[test]
    fn test_step_result_json_shape() {
        let r = StepResult::skipped("c", "condition evaluated to false");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["stepId"], "c");
        assert_eq!(v["status"], "skipped");
        assert_eq!(v["duration"], 0);
        assert!(v.get("error").is_none());
        assert_eq!(v["reason"], "condition evaluated to false");
    }
}
