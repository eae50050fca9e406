//! Shared domain types for Sagaflow.
//!
//! Workflow documents, execution state, lifecycle events, validation results
//! and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, chrono.

pub mod config;
pub mod event;
pub mod execution;
pub mod validation;
pub mod workflow;
