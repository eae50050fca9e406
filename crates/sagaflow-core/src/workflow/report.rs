//! JSON execution report.
//!
//! Shape: `{workflow, simulation, events, stepResults}` plus `compensations`
//! and `error` when there is something to report.

use std::io::Write;
use std::path::Path;

use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::execution::{ExecutionState, StepResult};
use sagaflow_types::workflow::WorkflowDefinition;
use serde::Serialize;

use super::context::{CompensationRecord, ExecutionContext};
use super::executor::ExecutorError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub success: bool,
    /// Milliseconds.
    pub duration: u64,
    pub steps_executed: usize,
    pub state: ExecutionState,
}

/// Everything a caller needs to persist about one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub workflow: WorkflowSummary,
    pub simulation: RunSummary,
    pub events: Vec<WorkflowEvent>,
    pub step_results: Vec<StepResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compensations: Vec<CompensationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn build(
        definition: &WorkflowDefinition,
        context: &ExecutionContext,
        error: Option<&ExecutorError>,
    ) -> Self {
        Self {
            workflow: WorkflowSummary {
                workflow_id: definition.workflow_id.clone(),
                name: definition.name.clone(),
                version: definition.version.clone(),
            },
            simulation: RunSummary {
                run_id: context.run_id.to_string(),
                success: error.is_none() && context.state() == ExecutionState::Completed,
                duration: context.elapsed_ms(),
                steps_executed: context.steps_executed(),
                state: context.state(),
            },
            events: context.events().to_vec(),
            step_results: context.step_results().to_vec(),
            compensations: context.compensations().to_vec(),
            error: error.map(ToString::to_string),
        }
    }

    /// Write the report as pretty-printed JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        tracing::debug!(path = %path.display(), "execution report written");
        Ok(())
    }
}
