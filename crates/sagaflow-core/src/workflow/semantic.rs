//! Semantic validation: reference, cycle and timeout checks.
//!
//! Works on the untyped document and tolerates structural problems, so a
//! document missing `version` is still checked for cyclic dependencies.

use std::collections::HashSet;

use sagaflow_types::validation::ValidationIssue;
use serde_json::Value;

use super::dag::{DependencyGraph, document_nested_lists};

/// A step located in the document, with its pointer-like path.
struct LocatedStep<'a> {
    path: String,
    step: &'a Value,
}

impl LocatedStep<'_> {
    fn id(&self) -> Option<&str> {
        self.step.get("stepId").and_then(Value::as_str)
    }
}

/// Run reference, cycle and timeout checks against `document`.
pub fn check_semantics(document: &Value) -> Vec<ValidationIssue> {
    let mut steps = Vec::new();
    if let Some(list) = document.get("steps").and_then(Value::as_array) {
        locate_steps(list, "/steps", &mut steps);
    }

    let all_ids: HashSet<&str> = steps.iter().filter_map(LocatedStep::id).collect();
    let compensation_ids: HashSet<&str> = steps
        .iter()
        .filter(|s| s.step.get("type").and_then(Value::as_str) == Some("compensation"))
        .filter_map(LocatedStep::id)
        .collect();

    let mut issues = Vec::new();

    for located in &steps {
        let id = located.id().unwrap_or("<unnamed>");

        if let Some(deps) = located.step.get("dependsOn").and_then(Value::as_array) {
            for (i, dep) in deps.iter().enumerate() {
                let Some(dep) = dep.as_str() else { continue };
                if !all_ids.contains(dep) {
                    issues.push(ValidationIssue::error(
                        format!("{}/dependsOn/{i}", located.path),
                        format!("Step '{id}' depends on unknown step '{dep}'"),
                    ));
                }
            }
        }

        if let Some(target) = located.step.get("compensation").and_then(Value::as_str) {
            let path = format!("{}/compensation", located.path);
            if !all_ids.contains(target) {
                issues.push(ValidationIssue::error(
                    path,
                    format!("Step '{id}' references unknown compensation step '{target}'"),
                ));
            } else if !compensation_ids.contains(target) {
                issues.push(ValidationIssue::warning(
                    path,
                    format!(
                        "Step '{id}' references compensation step '{target}' which is not of type 'compensation'"
                    ),
                ));
            }
        }
    }

    if let Some(cycle) = DependencyGraph::from_document(document).find_cycle() {
        issues.push(ValidationIssue::error(
            "/steps",
            format!("Circular dependency detected: {}", cycle.join(" -> ")),
        ));
    }

    if let Some(workflow_timeout) = document.get("timeout").and_then(Value::as_u64) {
        for located in &steps {
            if let Some(step_timeout) = located.step.get("timeout").and_then(Value::as_u64) {
                if step_timeout > workflow_timeout {
                    issues.push(ValidationIssue::warning(
                        format!("{}/timeout", located.path),
                        format!(
                            "Step '{}' timeout ({step_timeout}ms) exceeds workflow timeout ({workflow_timeout}ms)",
                            located.id().unwrap_or("<unnamed>")
                        ),
                    ));
                }
            }
        }
    }

    issues
}

/// Depth-first, document order. Paths mirror the structural validator's.
fn locate_steps<'a>(list: &'a [Value], path: &str, out: &mut Vec<LocatedStep<'a>>) {
    for (i, step) in list.iter().enumerate() {
        let step_path = format!("{path}/{i}");
        out.push(LocatedStep {
            path: step_path.clone(),
            step,
        });
        for (suffix, nested) in document_nested_lists(step) {
            locate_steps(nested, &format!("{step_path}/{suffix}"), out);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sagaflow_types::validation::Severity;
    use serde_json::json;

    fn errors(issues: &[ValidationIssue]) -> Vec<&str> {
        issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
            .collect()
    }

    fn warnings(issues: &[ValidationIssue]) -> Vec<&str> {
        issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.as_str())
            .collect()
    }

    #[test]
    fn test_unknown_dependency_names_step() {
        let doc = json!({ "steps": [
            { "stepId": "a", "type": "task", "action": "x", "dependsOn": ["ghost"] }
        ]});
        let issues = check_semantics(&doc);
        assert_eq!(errors(&issues), vec!["Step 'a' depends on unknown step 'ghost'"]);
        assert_eq!(issues[0].path, "/steps/0/dependsOn/0");
    }

    #[test]
    fn test_dependency_on_nested_step_is_known() {
        let doc = json!({ "steps": [
            { "stepId": "p", "type": "parallel", "branches": [
                { "branchId": "b", "steps": [ { "stepId": "inner", "type": "task", "action": "x" } ] }
            ]},
            { "stepId": "after", "type": "task", "action": "y", "dependsOn": ["inner"] }
        ]});
        assert!(check_semantics(&doc).is_empty());
    }

    #[test]
    fn test_two_step_cycle() {
        let doc = json!({ "steps": [
            { "stepId": "a", "type": "task", "action": "x", "dependsOn": ["b"] },
            { "stepId": "b", "type": "task", "action": "y", "dependsOn": ["a"] }
        ]});
        let issues = check_semantics(&doc);
        assert_eq!(errors(&issues), vec!["Circular dependency detected: a -> b -> a"]);
    }

    #[test]
    fn test_cycle_detected_without_version() {
        // No version, no name: still checked.
        let doc = json!({ "steps": [
            { "stepId": "a", "dependsOn": ["a"] }
        ]});
        let issues = check_semantics(&doc);
        assert!(errors(&issues)[0].contains("Circular dependency"));
    }

    #[test]
    fn test_compensation_references() {
        let doc = json!({ "steps": [
            { "stepId": "charge", "type": "task", "action": "pay", "compensation": "refund" },
            { "stepId": "ship", "type": "task", "action": "ship", "compensation": "charge" },
            { "stepId": "pack", "type": "task", "action": "pack", "compensation": "nowhere" },
            { "stepId": "refund", "type": "compensation", "action": "refund" }
        ]});
        let issues = check_semantics(&doc);
        assert_eq!(
            errors(&issues),
            vec!["Step 'pack' references unknown compensation step 'nowhere'"]
        );
        assert_eq!(warnings(&issues).len(), 1);
        assert!(warnings(&issues)[0].contains("'charge'"));
    }

    #[test]
    fn test_step_timeout_exceeding_workflow_timeout_warns() {
        let doc = json!({ "timeout": 1000, "steps": [
            { "stepId": "c", "type": "conditional", "cases": [
                { "condition": true, "steps": [
                    { "stepId": "slow", "type": "task", "action": "x", "timeout": 5000 }
                ]}
            ]}
        ]});
        let issues = check_semantics(&doc);
        assert!(errors(&issues).is_empty());
        let warns = warnings(&issues);
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("5000ms"));
        assert!(warns[0].contains("1000ms"));
        assert_eq!(issues[0].path, "/steps/0/cases/0/steps/0/timeout");
    }

    #[test]
    fn test_nested_issue_paths_point_into_branches_and_default() {
        let doc = json!({ "steps": [
            { "stepId": "p", "type": "parallel", "branches": [
                { "branchId": "one", "steps": [ { "stepId": "x", "type": "task", "action": "x" } ] },
                { "branchId": "two", "steps": [
                    { "stepId": "y", "type": "task", "action": "y", "dependsOn": ["ghost"] }
                ]}
            ]},
            { "stepId": "c", "type": "conditional", "cases": [], "default": [
                { "stepId": "z", "type": "task", "action": "z", "dependsOn": ["phantom"] }
            ]}
        ]});
        let issues = check_semantics(&doc);
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/steps/0/branches/1/steps/0/dependsOn/0", "/steps/1/default/0/dependsOn/0"]
        );
    }

    #[test]
    fn test_non_object_document_has_no_semantic_issues() {
        assert!(check_semantics(&Value::Null).is_empty());
    }
}
