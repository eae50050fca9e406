//! Workflow validation entry point.
//!
//! Structural and semantic checks always both run; their issues are merged
//! and split by severity. Validation never fails, it only reports.

use sagaflow_types::validation::ValidationResult;
use serde_json::Value;

use super::semantic::check_semantics;
use super::structural::check_structure;

/// Validate an untyped workflow document.
///
/// `valid` is true only when the merged error list is empty; warnings never
/// invalidate a document.
pub fn validate(document: &Value) -> ValidationResult {
    let mut issues = check_structure(document);
    if document.is_object() {
        issues.extend(check_semantics(document));
    }

    let result = ValidationResult::from_issues(issues);
    tracing::debug!(
        valid = result.valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "workflow validated"
    );
    result
}
