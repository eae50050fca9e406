//! Workflow document types.
//!
//! `WorkflowDefinition` is the typed form of a submitted workflow document.
//! Documents use camelCase keys (`workflowId`, `dependsOn`, `retryPolicy`, ...)
//! and select the step variant with a `type` tag. A definition is read-only
//! once handed to the engine.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A complete workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Opaque workflow identifier.
    pub workflow_id: String,
    /// Human-readable name.
    pub name: String,
    /// Dotted numeric version (e.g. "1.0.0").
    pub version: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow-wide duration budget in milliseconds.
    #[serde(
        default,
        rename = "timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u64>,
    /// How completed steps are unwound when the workflow fails.
    #[serde(default)]
    pub compensation_policy: CompensationPolicy,
    /// Top-level steps. Order is for readability; scheduling follows `dependsOn`.
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Every step in the document, depth-first in document order, including
    /// steps nested in parallel branches and conditional cases.
    pub fn all_steps(&self) -> Vec<&StepDefinition> {
        let mut out = Vec::new();
        collect_steps(&self.steps, &mut out);
        out
    }

    /// Find the first step with the given ID anywhere in the document.
    pub fn find_step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.all_steps().into_iter().find(|s| s.step_id == step_id)
    }

    /// All `compensation`-typed steps keyed by step ID.
    pub fn compensation_steps(&self) -> HashMap<&str, &StepDefinition> {
        self.all_steps()
            .into_iter()
            .filter(|s| s.step_type() == StepType::Compensation)
            .map(|s| (s.step_id.as_str(), s))
            .collect()
    }
}

fn collect_steps<'a>(steps: &'a [StepDefinition], out: &mut Vec<&'a StepDefinition>) {
    for step in steps {
        out.push(step);
        for nested in step.nested_step_lists() {
            collect_steps(nested, out);
        }
    }
}

/// Rollback scope applied when a workflow fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationPolicy {
    /// Unwind the whole compensation stack, most recent first.
    #[default]
    Full,
    /// Unwind only the most recently pushed compensation entry.
    Partial,
    /// Never compensate.
    None,
}

impl std::fmt::Display for CompensationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompensationPolicy::Full => write!(f, "full"),
            CompensationPolicy::Partial => write!(f, "partial"),
            CompensationPolicy::None => write!(f, "none"),
        }
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step. Common fields live here; variant payload is in `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique within its containing step list.
    pub step_id: String,
    /// Step IDs in the same or an ancestor scope that must resolve first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Opaque predicate; a false condition skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Per-attempt timeout in milliseconds.
    #[serde(
        default,
        rename = "timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Step ID of the `compensation` step that undoes this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl StepDefinition {
    pub fn step_type(&self) -> StepType {
        match self.kind {
            StepKind::Task { .. } => StepType::Task,
            StepKind::Parallel { .. } => StepType::Parallel,
            StepKind::Conditional { .. } => StepType::Conditional,
            StepKind::Compensation { .. } => StepType::Compensation,
        }
    }

    /// Step IDs that must have results before this step can start.
    ///
    /// For a task that is its own `dependsOn`. For a parallel or conditional
    /// step it also includes every dependency of a nested step, at any depth,
    /// that points outside this step. In declaration order, without repeats.
    pub fn external_dependencies(&self) -> Vec<&str> {
        let mut nested = Vec::new();
        for list in self.nested_step_lists() {
            collect_steps(list, &mut nested);
        }
        let inside: HashSet<&str> = nested.iter().map(|s| s.step_id.as_str()).collect();

        let mut deps: Vec<&str> = Vec::new();
        let declared = self
            .depends_on
            .iter()
            .chain(nested.iter().flat_map(|s| s.depends_on.iter()));
        for dep in declared {
            let dep = dep.as_str();
            if dep != self.step_id && !inside.contains(dep) && !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }

    /// Nested step lists: parallel branches, conditional cases, then `default`.
    pub fn nested_step_lists(&self) -> Vec<&[StepDefinition]> {
        match &self.kind {
            StepKind::Parallel { branches } => {
                branches.iter().map(|b| b.steps.as_slice()).collect()
            }
            StepKind::Conditional { cases, default } => cases
                .iter()
                .map(|c| c.steps.as_slice())
                .chain(default.as_deref())
                .collect(),
            StepKind::Task { .. } | StepKind::Compensation { .. } => Vec::new(),
        }
    }

    /// The unit-of-work action for task and compensation steps.
    pub fn action(&self) -> Option<(&str, &Value)> {
        match &self.kind {
            StepKind::Task { action, inputs } | StepKind::Compensation { action, inputs } => {
                Some((action.as_str(), inputs))
            }
            _ => None,
        }
    }
}

/// The kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Parallel,
    Conditional,
    Compensation,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Task => "task",
            StepType::Parallel => "parallel",
            StepType::Conditional => "conditional",
            StepType::Compensation => "compensation",
        }
    }

    /// Parse the document's `type` tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(StepType::Task),
            "parallel" => Some(StepType::Parallel),
            "conditional" => Some(StepType::Conditional),
            "compensation" => Some(StepType::Compensation),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant payload, internally tagged by `type`:
///
/// ```yaml
/// - stepId: charge
///   type: task
///   action: payments.charge
///   inputs: { amount: 42 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Invoke the task executor once (plus retries).
    Task {
        action: String,
        #[serde(default)]
        inputs: Value,
    },
    /// Run every branch concurrently.
    Parallel { branches: Vec<Branch> },
    /// First case whose condition holds wins; otherwise `default`.
    Conditional {
        cases: Vec<ConditionalCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Vec<StepDefinition>>,
    },
    /// Same shape as a task, only run during rollback.
    Compensation {
        action: String,
        #[serde(default)]
        inputs: Value,
    },
}

/// One branch of a parallel step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub branch_id: String,
    pub steps: Vec<StepDefinition>,
}

/// One case of a conditional step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalCase {
    pub condition: Condition,
    pub steps: Vec<StepDefinition>,
}

/// An opaque, pre-evaluated predicate.
///
/// The engine does not interpret expressions; a `ConditionEvaluator` decides
/// truthiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Bool(bool),
    Text(String),
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Condition::Bool(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Condition::Text(value.to_string())
    }
}

/// What a step failure does to the rest of the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Escalate to workflow failure (and compensation).
    #[default]
    Fail,
    /// Record the failure and keep scheduling.
    Continue,
}

// ---------------------------------------------------------------------------
// Retry Policy
// ---------------------------------------------------------------------------

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Growth factor per additional attempt (>= 1).
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Backoff after the given failed attempt (1-based):
    /// `backoffMs * backoffMultiplier^(attempt - 1)`.
    pub fn backoff_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.backoff_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        if delay.is_finite() && delay < u64::MAX as f64 {
            delay as u64
        } else {
            u64::MAX
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
