//! Infrastructure layer for Sagaflow.
//!
//! Contains the pieces that touch the outside world: the `sagaflow.toml`
//! loader and concrete `TaskExecutor` implementations for `sagaflow-core`.

pub mod config;
pub mod workflow;
