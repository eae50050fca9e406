//! Structural validation: checks the shape of an untyped workflow document.
//!
//! Every violation becomes one `ValidationIssue` with a pointer-like path
//! (`/steps/0/retryPolicy/maxAttempts`). Checking never stops at the first
//! problem.

use std::collections::HashSet;

use sagaflow_types::validation::ValidationIssue;
use sagaflow_types::workflow::StepType;
use serde_json::{Map, Value};

const COMPENSATION_POLICIES: &[&str] = &["full", "partial", "none"];
const ON_FAILURE_POLICIES: &[&str] = &["fail", "continue"];
const STEP_TYPES: &[&str] = &["task", "parallel", "conditional", "compensation"];

/// Run every shape check against `document`.
///
/// A non-object (or null) document yields a single error and nothing else.
pub fn check_structure(document: &Value) -> Vec<ValidationIssue> {
    let Some(root) = document.as_object() else {
        return vec![ValidationIssue::error("", "Workflow must be a non-null object")];
    };

    let mut checker = ShapeChecker::default();
    checker.root(root);
    checker.issues
}

/// Plain `major.minor.patch`: no pre-release or build suffix, no leading zeros.
fn is_release_version(version: &str) -> bool {
    semver::Version::parse(version).is_ok_and(|v| v.pre.is_empty() && v.build.is_empty())
}

#[derive(Default)]
struct ShapeChecker {
    issues: Vec<ValidationIssue>,
}

impl ShapeChecker {
    fn error(&mut self, path: String, message: impl Into<String>) {
        self.issues.push(ValidationIssue::error(path, message));
    }

    fn root(&mut self, root: &Map<String, Value>) {
        self.required_string(root, "", "workflowId");
        self.required_string(root, "", "name");

        match root.get("version") {
            None => self.error("/version".into(), "missing required field 'version'"),
            Some(Value::String(v)) => {
                if !is_release_version(v) {
                    self.error("/version".into(), "must match pattern major.minor.patch");
                }
            }
            Some(_) => self.error("/version".into(), "must be a string"),
        }

        if root.get("description").is_some_and(|d| !d.is_string()) {
            self.error("/description".into(), "must be a string");
        }
        self.optional_positive_int(root, "", "timeout");
        self.optional_enum(root, "", "compensationPolicy", COMPENSATION_POLICIES);

        match root.get("steps") {
            None => self.error("/steps".into(), "missing required field 'steps'"),
            Some(steps) => self.step_list(steps, "/steps"),
        }
    }

    fn step_list(&mut self, value: &Value, path: &str) {
        let Some(steps) = value.as_array() else {
            self.error(path.to_string(), "must be an array");
            return;
        };
        if steps.is_empty() {
            self.error(path.to_string(), "must contain at least 1 item");
            return;
        }

        let mut seen = HashSet::new();
        for (i, step) in steps.iter().enumerate() {
            let step_path = format!("{path}/{i}");
            if let Some(id) = step.get("stepId").and_then(Value::as_str) {
                if !id.is_empty() && !seen.insert(id) {
                    self.error(format!("{step_path}/stepId"), format!("duplicate step ID '{id}'"));
                }
            }
            self.step(step, &step_path);
        }
    }

    fn step(&mut self, value: &Value, path: &str) {
        let Some(step) = value.as_object() else {
            self.error(path.to_string(), "must be an object");
            return;
        };

        self.required_string(step, path, "stepId");

        let step_type = match step.get("type") {
            None => {
                self.error(format!("{path}/type"), "missing required field 'type'");
                None
            }
            Some(Value::String(t)) => {
                let parsed = StepType::parse(t);
                if parsed.is_none() {
                    self.error(
                        format!("{path}/type"),
                        format!("must be one of: {}", STEP_TYPES.join(", ")),
                    );
                }
                parsed
            }
            Some(_) => {
                self.error(format!("{path}/type"), "must be a string");
                None
            }
        };

        if let Some(deps) = step.get("dependsOn") {
            match deps.as_array() {
                Some(items) => {
                    for (i, dep) in items.iter().enumerate() {
                        if !dep.is_string() {
                            self.error(format!("{path}/dependsOn/{i}"), "must be a string");
                        }
                    }
                }
                None => self.error(format!("{path}/dependsOn"), "must be an array"),
            }
        }

        if let Some(condition) = step.get("condition") {
            self.condition(condition, &format!("{path}/condition"));
        }
        self.optional_positive_int(step, path, "timeout");
        if let Some(retry) = step.get("retryPolicy") {
            self.retry_policy(retry, &format!("{path}/retryPolicy"));
        }
        if step.get("compensation").is_some_and(|c| !c.is_string()) {
            self.error(format!("{path}/compensation"), "must be a string");
        }
        self.optional_enum(step, path, "onFailure", ON_FAILURE_POLICIES);

        match step_type {
            Some(StepType::Task) | Some(StepType::Compensation) => {
                self.required_string(step, path, "action");
            }
            Some(StepType::Parallel) => self.branches(step, path),
            Some(StepType::Conditional) => self.cases(step, path),
            None => {}
        }
    }

    fn branches(&mut self, step: &Map<String, Value>, path: &str) {
        let branches_path = format!("{path}/branches");
        let Some(value) = step.get("branches") else {
            self.error(branches_path, "missing required field 'branches'");
            return;
        };
        let Some(branches) = value.as_array() else {
            self.error(branches_path, "must be an array");
            return;
        };
        if branches.is_empty() {
            self.error(branches_path, "must contain at least 1 item");
            return;
        }

        for (i, branch) in branches.iter().enumerate() {
            let branch_path = format!("{branches_path}/{i}");
            let Some(obj) = branch.as_object() else {
                self.error(branch_path, "must be an object");
                continue;
            };
            self.required_string(obj, &branch_path, "branchId");
            match obj.get("steps") {
                Some(steps) => self.step_list(steps, &format!("{branch_path}/steps")),
                None => self.error(
                    format!("{branch_path}/steps"),
                    "missing required field 'steps'",
                ),
            }
        }
    }

    fn cases(&mut self, step: &Map<String, Value>, path: &str) {
        let cases_path = format!("{path}/cases");
        match step.get("cases") {
            None => self.error(cases_path, "missing required field 'cases'"),
            Some(value) => match value.as_array() {
                None => self.error(cases_path, "must be an array"),
                Some(cases) if cases.is_empty() => {
                    self.error(cases_path, "must contain at least 1 item")
                }
                Some(cases) => {
                    for (i, case) in cases.iter().enumerate() {
                        let case_path = format!("{cases_path}/{i}");
                        let Some(obj) = case.as_object() else {
                            self.error(case_path, "must be an object");
                            continue;
                        };
                        match obj.get("condition") {
                            Some(c) => self.condition(c, &format!("{case_path}/condition")),
                            None => self.error(
                                format!("{case_path}/condition"),
                                "missing required field 'condition'",
                            ),
                        }
                        match obj.get("steps") {
                            Some(steps) => self.step_list(steps, &format!("{case_path}/steps")),
                            None => self.error(
                                format!("{case_path}/steps"),
                                "missing required field 'steps'",
                            ),
                        }
                    }
                }
            },
        }

        if let Some(default) = step.get("default") {
            self.step_list(default, &format!("{path}/default"));
        }
    }

    fn condition(&mut self, value: &Value, path: &str) {
        if !(value.is_boolean() || value.is_string()) {
            self.error(path.to_string(), "must be a boolean or a string");
        }
    }

    fn retry_policy(&mut self, value: &Value, path: &str) {
        let Some(policy) = value.as_object() else {
            self.error(path.to_string(), "must be an object");
            return;
        };

        if let Some(v) = policy.get("maxAttempts") {
            match v.as_u64() {
                Some(n) if n >= 1 => {}
                Some(_) => self.error(format!("{path}/maxAttempts"), "must be >= 1"),
                None => self.error(format!("{path}/maxAttempts"), "must be an integer >= 1"),
            }
        }
        if policy.get("backoffMs").is_some_and(|v| v.as_u64().is_none()) {
            self.error(format!("{path}/backoffMs"), "must be an integer >= 0");
        }
        if let Some(v) = policy.get("backoffMultiplier") {
            match v.as_f64() {
                Some(m) if m >= 1.0 => {}
                Some(_) => self.error(format!("{path}/backoffMultiplier"), "must be >= 1"),
                None => self.error(format!("{path}/backoffMultiplier"), "must be a number"),
            }
        }
    }

    fn required_string(&mut self, obj: &Map<String, Value>, path: &str, field: &str) {
        let field_path = format!("{path}/{field}");
        match obj.get(field) {
            None => self.error(field_path, format!("missing required field '{field}'")),
            Some(Value::String(s)) if s.is_empty() => {
                self.error(field_path, "must not be empty")
            }
            Some(Value::String(_)) => {}
            Some(_) => self.error(field_path, "must be a string"),
        }
    }

    fn optional_positive_int(&mut self, obj: &Map<String, Value>, path: &str, field: &str) {
        if let Some(v) = obj.get(field) {
            match v.as_u64() {
                Some(n) if n >= 1 => {}
                _ => self.error(format!("{path}/{field}"), "must be an integer >= 1"),
            }
        }
    }

    fn optional_enum(&mut self, obj: &Map<String, Value>, path: &str, field: &str, allowed: &[&str]) {
        if let Some(v) = obj.get(field) {
            let ok = v.as_str().is_some_and(|s| allowed.contains(&s));
            if !ok {
                self.error(
                    format!("{path}/{field}"),
                    format!("must be one of: {}", allowed.join(", ")),
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
