//! Simulated task executor.
//!
//! [`SimulatedTaskExecutor`] implements the [`TaskExecutor`] trait from
//! sagaflow-core without performing any side effect. It is driven entirely by
//! [`SimulationConfig`]: a fixed latency per attempt, actions that always
//! fail, and actions that fail a fixed number of attempts before succeeding.

use std::time::Duration;

use sagaflow_core::workflow::task::{TaskError, TaskExecutor, TaskInvocation};
use sagaflow_types::config::SimulationConfig;
use serde_json::{Value, json};

/// In-process executor that pretends to run every action.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTaskExecutor {
    config: SimulationConfig,
}

impl SimulatedTaskExecutor {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn outcome(&self, invocation: &TaskInvocation) -> Result<Value, TaskError> {
        let action = invocation.action.as_str();

        if self.config.fail_actions.iter().any(|a| a == action) {
            return Err(TaskError::Failed(format!("simulated failure of '{action}'")));
        }
        if let Some(failures) = self.config.flaky_actions.get(action) {
            if invocation.attempt <= *failures {
                return Err(TaskError::Failed(format!(
                    "simulated transient failure of '{action}' (attempt {})",
                    invocation.attempt
                )));
            }
        }

        Ok(json!({
            "stepId": invocation.step_id,
            "action": action,
            "attempt": invocation.attempt,
            "inputs": invocation.inputs,
        }))
    }
}

impl TaskExecutor for SimulatedTaskExecutor {
    async fn run(&self, invocation: &TaskInvocation) -> Result<Value, TaskError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        let result = self.outcome(invocation);
        tracing::debug!(
            step_id = %invocation.step_id,
            action = %invocation.action,
            attempt = invocation.attempt,
            ok = result.is_ok(),
            "simulated task"
        );
        result
    }
}
