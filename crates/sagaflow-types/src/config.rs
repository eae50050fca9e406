//! Engine configuration types.
//!
//! `EngineConfig` represents the `sagaflow.toml` that tunes the engine and the
//! simulated task executor. All fields have sensible defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::workflow::{RetryPolicy, StepDefinition};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the lifecycle event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Retry policy for steps that do not declare one.
    #[serde(default = "RetryPolicy::single_attempt")]
    pub default_retry: RetryPolicy,

    /// Upper bound for a single computed backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-attempt timeout for steps that do not declare one.
    #[serde(default)]
    pub default_step_timeout_ms: Option<u64>,

    /// Settings for the simulated task executor.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            default_retry: RetryPolicy::single_attempt(),
            max_backoff_ms: default_max_backoff_ms(),
            default_step_timeout_ms: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Effective per-attempt timeout: the step's own, else the configured default.
    pub fn resolve_step_timeout(&self, step: &StepDefinition) -> Option<u64> {
        step.timeout_ms.or(self.default_step_timeout_ms)
    }

    /// Effective retry policy: the step's own, else the configured default.
    pub fn resolve_retry_policy<'a>(&'a self, step: &'a StepDefinition) -> &'a RetryPolicy {
        step.retry_policy.as_ref().unwrap_or(&self.default_retry)
    }
}

/// Behavior of the simulated task executor used by `sagaflow run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Artificial latency per attempt.
    #[serde(default)]
    pub latency_ms: u64,

    /// Actions that fail on every attempt.
    #[serde(default)]
    pub fail_actions: Vec<String>,

    /// Actions that fail their first N attempts, then succeed.
    #[serde(default)]
    pub flaky_actions: HashMap<String, u32>,
}
