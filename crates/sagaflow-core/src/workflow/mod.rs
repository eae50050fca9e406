//! Workflow engine core: validation, scheduling, retry and saga compensation.
//!
//! - `definition` -- JSON/YAML loading and conversion to the typed model
//! - `dag` -- dependency graph builder and cycle detection
//! - `structural` / `semantic` / `validator` -- document checks
//! - `context` -- per-run execution state
//! - `task` -- pluggable unit-of-work executor trait
//! - `condition` -- injected condition predicates
//! - `retry` -- bounded retry with exponential backoff
//! - `compensation` -- saga rollback coordinator
//! - `executor` -- dependency-driven step scheduler
//! - `report` -- JSON execution report

pub mod compensation;
pub mod condition;
pub mod context;
pub mod dag;
pub mod definition;
pub mod executor;
pub mod report;
pub mod retry;
pub mod semantic;
pub mod structural;
pub mod task;
pub mod validator;
