//! Lifecycle events published by the workflow engine.
//!
//! `WorkflowEvent` is the only channel through which observers (CLI, loggers,
//! telemetry) follow a run. All variants are Clone + Send + Sync for use with
//! tokio broadcast channels, and serialize as `{"type": "step:start", ...}`.

use serde::{Deserialize, Serialize};

/// Events emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WorkflowEvent {
    #[serde(rename = "workflow:start")]
    WorkflowStart {
        workflow_id: String,
        name: String,
        version: String,
        run_id: String,
    },

    #[serde(rename = "step:start")]
    StepStart { step_id: String, step_type: String },

    #[serde(rename = "step:complete")]
    StepComplete {
        step_id: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
        attempts: u32,
    },

    #[serde(rename = "step:failed")]
    StepFailed {
        step_id: String,
        error: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },

    #[serde(rename = "step:skipped")]
    StepSkipped { step_id: String, reason: String },

    /// A failed attempt that will be retried after `backoff` milliseconds.
    #[serde(rename = "step:retry")]
    StepRetry {
        step_id: String,
        attempt: u32,
        max_attempts: u32,
        #[serde(rename = "backoff")]
        backoff_ms: u64,
        error: String,
    },

    #[serde(rename = "parallel:start")]
    ParallelStart { step_id: String, branches: usize },

    #[serde(rename = "parallel:complete")]
    ParallelComplete {
        step_id: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },

    #[serde(rename = "parallel:failed")]
    ParallelFailed {
        step_id: String,
        failed_branches: Vec<String>,
        error: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },

    #[serde(rename = "conditional:matched")]
    ConditionalMatched { step_id: String, case_index: usize },

    #[serde(rename = "conditional:default")]
    ConditionalDefault { step_id: String },

    #[serde(rename = "compensation:start")]
    CompensationStart { stack_size: usize },

    #[serde(rename = "compensation:step")]
    CompensationStep {
        step_id: String,
        compensation_step_id: String,
    },

    #[serde(rename = "compensation:complete")]
    CompensationComplete { compensated: usize },

    /// One or more compensation steps raised; published instead of
    /// `compensation:complete`.
    #[serde(rename = "compensation:failed")]
    CompensationFailed {
        failed_steps: Vec<String>,
        error: String,
    },

    #[serde(rename = "workflow:complete")]
    WorkflowComplete {
        workflow_id: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
        steps_executed: usize,
    },

    #[serde(rename = "workflow:failed")]
    WorkflowFailed {
        workflow_id: String,
        error: String,
        #[serde(rename = "duration")]
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    /// The wire name of the event (`"step:start"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStart { .. } => "workflow:start",
            WorkflowEvent::StepStart { .. } => "step:start",
            WorkflowEvent::StepComplete { .. } => "step:complete",
            WorkflowEvent::StepFailed { .. } => "step:failed",
            WorkflowEvent::StepSkipped { .. } => "step:skipped",
            WorkflowEvent::StepRetry { .. } => "step:retry",
            WorkflowEvent::ParallelStart { .. } => "parallel:start",
            WorkflowEvent::ParallelComplete { .. } => "parallel:complete",
            WorkflowEvent::ParallelFailed { .. } => "parallel:failed",
            WorkflowEvent::ConditionalMatched { .. } => "conditional:matched",
            WorkflowEvent::ConditionalDefault { .. } => "conditional:default",
            WorkflowEvent::CompensationStart { .. } => "compensation:start",
            WorkflowEvent::CompensationStep { .. } => "compensation:step",
            WorkflowEvent::CompensationComplete { .. } => "compensation:complete",
            WorkflowEvent::CompensationFailed { .. } => "compensation:failed",
            WorkflowEvent::WorkflowComplete { .. } => "workflow:complete",
            WorkflowEvent::WorkflowFailed { .. } => "workflow:failed",
        }
    }

    /// The step this event refers to, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::StepStart { step_id, .. }
            | WorkflowEvent::StepComplete { step_id, .. }
            | WorkflowEvent::StepFailed { step_id, .. }
            | WorkflowEvent::StepSkipped { step_id, .. }
            | WorkflowEvent::StepRetry { step_id, .. }
            | WorkflowEvent::ParallelStart { step_id, .. }
            | WorkflowEvent::ParallelComplete { step_id, .. }
            | WorkflowEvent::ParallelFailed { step_id, .. }
            | WorkflowEvent::ConditionalMatched { step_id, .. }
            | WorkflowEvent::ConditionalDefault { step_id }
            | WorkflowEvent::CompensationStep { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = WorkflowEvent::StepRetry {
            step_id: "charge".to_string(),
            attempt: 1,
            max_attempts: 3,
            backoff_ms: 250,
            error: "gateway timeout".to_string(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "step:retry");
        assert_eq!(v["stepId"], "charge");
        assert_eq!(v["maxAttempts"], 3);
        assert_eq!(v["backoff"], 250);
        assert_eq!(event.kind(), "step:retry");
    }

    #[test]
    fn test_event_deserializes_from_wire_name() {
        let v = serde_json::json!({"type": "conditional:default", "stepId": "route"});
        let event: WorkflowEvent = serde_json::from_value(v).unwrap();
        assert_eq!(
            event,
            WorkflowEvent::ConditionalDefault {
                step_id: "route".to_string()
            }
        );
        assert_eq!(event.step_id(), Some("route"));
    }

    #[test]
    fn test_workflow_level_events_have_no_step() {
        let event = WorkflowEvent::CompensationStart { stack_size: 2 };
        assert_eq!(event.step_id(), None);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["stackSize"], 2);
    }
}
