//! Injected condition predicates.
//!
//! The engine has no expression language. A `ConditionEvaluator` decides
//! whether a step's (or a case's) `condition` holds; any closure with the
//! right signature is one.

use sagaflow_types::workflow::Condition;
use serde_json::Value;

/// Decides the truthiness of an opaque condition.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, step_id: &str, condition: &Condition, inputs: &Value) -> bool;
}

impl<F> ConditionEvaluator for F
where
    F: Fn(&str, &Condition, &Value) -> bool + Send + Sync,
{
    fn evaluate(&self, step_id: &str, condition: &Condition, inputs: &Value) -> bool {
        self(step_id, condition, inputs)
    }
}

/// Treats conditions as pre-evaluated values.
///
/// Booleans are taken as-is. Strings are false when empty or one of
/// `false`, `0`, `no`, `off` (case-insensitive), true otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruthyConditions;

impl ConditionEvaluator for TruthyConditions {
    fn evaluate(&self, _step_id: &str, condition: &Condition, _inputs: &Value) -> bool {
        match condition {
            Condition::Bool(b) => *b,
            Condition::Text(text) => {
                let text = text.trim().to_ascii_lowercase();
                !matches!(text.as_str(), "" | "false" | "0" | "no" | "off")
            }
        }
    }
}
