//! Task executors.
//!
//! - `simulated` -- configurable in-process executor used by `sagaflow run`

pub mod simulated;
