//! Workflow validation and execution for Sagaflow.
//!
//! This crate holds the engine proper. It depends only on `sagaflow-types`;
//! concrete task executors and configuration loading live in
//! `sagaflow-infra`.

pub mod event;
pub mod workflow;
