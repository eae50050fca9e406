//! Pluggable unit-of-work executor.
//!
//! The engine hands every task and compensation step to a `TaskExecutor` and
//! treats any returned error the same way, regardless of cause.
//!
//! Follows the RPITIT + object-safe wrapper pattern:
//! 1. `TaskExecutor` uses return-position `impl Future` for `run`
//! 2. `TaskExecutorDyn` is the object-safe variant with boxed futures
//! 3. `BoxTaskExecutor` wraps `Box<dyn TaskExecutorDyn>` and implements
//!    `TaskExecutor` again, so it can drive a `WorkflowEngine` directly

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Invocation and errors
// ---------------------------------------------------------------------------

/// Everything a unit of work receives for one attempt.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub step_id: String,
    pub action: String,
    /// The step's own `inputs`.
    pub inputs: Value,
    /// Inputs passed to the workflow run.
    pub workflow_inputs: Value,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Failure signal from a unit of work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The attempt did not finish within the step timeout.
    #[error("timed out after {0}ms")]
    Timeout(u64),
}

// ---------------------------------------------------------------------------
// TaskExecutor trait
// ---------------------------------------------------------------------------

/// Executes a single step's side effect: inputs in, output or failure out.
pub trait TaskExecutor: Send + Sync {
    fn run(
        &self,
        invocation: &TaskInvocation,
    ) -> impl Future<Output = Result<Value, TaskError>> + Send;
}

/// Object-safe version of [`TaskExecutor`] with boxed futures.
pub trait TaskExecutorDyn: Send + Sync {
    fn run_boxed<'a>(
        &'a self,
        invocation: &'a TaskInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send + 'a>>;
}

impl<T: TaskExecutor> TaskExecutorDyn for T {
    fn run_boxed<'a>(
        &'a self,
        invocation: &'a TaskInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<Value, TaskError>> + Send + 'a>> {
        Box::pin(self.run(invocation))
    }
}

/// Type-erased task executor for runtime selection.
pub struct BoxTaskExecutor {
    inner: Box<dyn TaskExecutorDyn>,
}

impl BoxTaskExecutor {
    pub fn new<T: TaskExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }
}

impl TaskExecutor for BoxTaskExecutor {
    async fn run(&self, invocation: &TaskInvocation) -> Result<Value, TaskError> {
        self.inner.run_boxed(invocation).await
    }
}

impl std::fmt::Debug for BoxTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTaskExecutor").finish_non_exhaustive()
    }
}
