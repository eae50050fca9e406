//! Workflow document loading and conversion.
//!
//! Documents are read as untyped JSON values (from JSON or YAML text) so the
//! validator can report every problem in malformed input, then converted to
//! the typed `WorkflowDefinition` for execution.

use std::path::Path;

use sagaflow_types::workflow::WorkflowDefinition;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or converting workflow documents.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Text format of a workflow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.yaml`/`.yml` is YAML, anything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }
}

/// Parse document text into an untyped value.
pub fn parse_workflow_document(text: &str, format: DocumentFormat) -> Result<Value, WorkflowError> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| WorkflowError::ParseError(e.to_string()))
        }
        DocumentFormat::Yaml => {
            serde_yaml_ng::from_str(text).map_err(|e| WorkflowError::ParseError(e.to_string()))
        }
    }
}

/// Load a workflow document from disk, picking the format from the extension.
pub fn load_workflow_document(path: &Path) -> Result<Value, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_document(&content, DocumentFormat::from_path(path))
}

/// Convert an untyped document into a typed definition.
///
/// This only checks that the document deserializes; call
/// [`validate`](super::validator::validate) for the full set of checks.
pub fn into_definition(document: &Value) -> Result<WorkflowDefinition, WorkflowError> {
    WorkflowDefinition::deserialize(document).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sagaflow_types::workflow::StepType;

    const YAML: &str = r#"
workflowId: wf-1
name: Demo
version: "1.0.0"
steps:
  - stepId: a
    type: task
    action: noop
"#;

    #[test]
    fn test_format_from_path() {
        assert_eq!(DocumentFormat::from_path(Path::new("w.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("w.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("w.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("w")), DocumentFormat::Json);
    }

    #[test]
    fn test_parse_yaml_into_definition() {
        let doc = parse_workflow_document(YAML, DocumentFormat::Yaml).unwrap();
        assert_eq!(doc["workflowId"], "wf-1");
        let def = into_definition(&doc).unwrap();
        assert_eq!(def.name, "Demo");
        assert_eq!(def.steps[0].step_type(), StepType::Task);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_workflow_document("{ not json", DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn test_into_definition_rejects_wrong_shape() {
        let doc = serde_json::json!({ "workflowId": "w", "steps": [] });
        let err = into_definition(&doc).unwrap_err();
        assert!(err.to_string().contains("parse error"), "got: {err}");
    }

    #[test]
    fn test_load_workflow_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.yaml");
        std::fs::write(&path, YAML).unwrap();

        let doc = load_workflow_document(&path).unwrap();
        assert_eq!(doc["steps"][0]["stepId"], "a");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_workflow_document(Path::new("/nonexistent/wf.json")).unwrap_err();
        assert!(matches!(err, WorkflowError::IoError(_)));
    }
}
