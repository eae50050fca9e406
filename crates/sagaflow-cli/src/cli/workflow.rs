//! `validate` and `run` command handlers.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::RecvError};

use sagaflow_core::workflow::definition::{
    DocumentFormat, into_definition, load_workflow_document, parse_workflow_document,
};
use sagaflow_core::workflow::executor::WorkflowEngine;
use sagaflow_core::workflow::report::ExecutionReport;
use sagaflow_core::workflow::task::BoxTaskExecutor;
use sagaflow_core::workflow::validator::validate;
use sagaflow_infra::config::load_engine_config;
use sagaflow_infra::workflow::simulated::SimulatedTaskExecutor;
use sagaflow_types::event::WorkflowEvent;
use sagaflow_types::execution::{StepResult, StepStatus};
use sagaflow_types::validation::ValidationResult;

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

/// Validate a workflow file. Returns whether it is valid.
pub fn validate_workflow(file: &Path, json: bool) -> Result<bool> {
    let document = load_workflow_document(file)
        .with_context(|| format!("Failed to load workflow file: {}", file.display()))?;
    let result = validate(&document);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_validation(file, &result);
    }
    Ok(result.valid)
}

fn print_validation(file: &Path, result: &ValidationResult) {
    println!();
    if result.valid {
        println!(
            "  {} {} is valid",
            style("*").green().bold(),
            style(file.display()).cyan()
        );
    } else {
        println!(
            "  {} {} has {} error(s)",
            style("x").red().bold(),
            style(file.display()).cyan(),
            result.errors.len()
        );
    }
    for issue in &result.errors {
        println!("    {} {}", style("error").red(), issue);
    }
    for issue in &result.warnings {
        println!("    {} {}", style("warning").yellow(), issue);
    }
    println!();
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Validate and execute a workflow with the simulated executor.
///
/// Returns whether the run completed successfully. Invalid documents are
/// reported like `validate` and never executed.
pub async fn run_workflow(
    file: &Path,
    inputs: Option<&str>,
    config_path: &Path,
    report_path: Option<&Path>,
    json: bool,
    quiet: bool,
) -> Result<bool> {
    let document = load_workflow_document(file)
        .with_context(|| format!("Failed to load workflow file: {}", file.display()))?;
    let validation = validate(&document);
    if !validation.valid {
        if json {
            println!("{}", serde_json::to_string_pretty(&validation)?);
        } else {
            print_validation(file, &validation);
        }
        return Ok(false);
    }
    let definition = into_definition(&document)?;
    let inputs = parse_inputs(inputs)?;

    let config = load_engine_config(config_path).await;
    let executor = BoxTaskExecutor::new(SimulatedTaskExecutor::new(config.simulation.clone()));
    let engine = WorkflowEngine::new(executor).with_config(config);

    let live = !json && !quiet;
    let printer = live.then(|| tokio::spawn(print_events(engine.subscribe())));

    if live {
        println!();
        println!(
            "  Running {} {}",
            style(&definition.name).cyan().bold(),
            style(format!("v{}", definition.version)).dim()
        );
        println!();
    }

    let outcome = engine.execute(&definition, inputs).await;
    // Dropping the engine closes the event channel and ends the printer.
    drop(engine);
    if let Some(printer) = printer {
        printer.await.context("event printer panicked")?;
    }

    let (context, error) = match outcome {
        Ok(context) => (context, None),
        Err(failure) => (*failure.context, Some(failure.error)),
    };
    let report = ExecutionReport::build(&definition, &context, error.as_ref());

    if let Some(path) = report_path {
        report
            .write_to(path)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, report_path);
    }
    Ok(report.simulation.success)
}

/// Parse `--inputs`: inline JSON when it looks like JSON, otherwise a file.
/// Absent inputs are an empty object.
pub fn parse_inputs(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(json!({}));
    };
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON in --inputs");
    }

    let path = Path::new(trimmed);
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inputs file: {}", path.display()))?;
    parse_workflow_document(&text, DocumentFormat::from_path(path))
        .with_context(|| format!("Failed to parse inputs file: {}", path.display()))
}

/// Print events as they arrive. The report is built from the run's own
/// journal, so a lagging printer only loses console lines.
async fn print_events(mut rx: broadcast::Receiver<WorkflowEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("  {}", describe_event(&event)),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event printer lagged, skipped events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// One human-readable line per lifecycle event.
pub fn describe_event(event: &WorkflowEvent) -> String {
    let kind = style(format!("{:<22}", event.kind()));
    let kind = match event {
        WorkflowEvent::StepFailed { .. }
        | WorkflowEvent::ParallelFailed { .. }
        | WorkflowEvent::CompensationFailed { .. }
        | WorkflowEvent::WorkflowFailed { .. } => kind.red(),
        WorkflowEvent::StepRetry { .. } | WorkflowEvent::StepSkipped { .. } => kind.yellow(),
        WorkflowEvent::CompensationStart { .. }
        | WorkflowEvent::CompensationStep { .. }
        | WorkflowEvent::CompensationComplete { .. } => kind.magenta(),
        _ => kind.dim(),
    };

    let detail = match event {
        WorkflowEvent::WorkflowStart { workflow_id, run_id, .. } => {
            format!("{workflow_id} (run {run_id})")
        }
        WorkflowEvent::StepStart { step_id, step_type } => format!("{step_id} [{step_type}]"),
        WorkflowEvent::StepComplete {
            step_id,
            duration_ms,
            attempts,
        } => format!("{step_id} in {duration_ms}ms, {attempts} attempt(s)"),
        WorkflowEvent::StepFailed { step_id, error, .. } => format!("{step_id}: {error}"),
        WorkflowEvent::StepSkipped { step_id, reason } => format!("{step_id}: {reason}"),
        WorkflowEvent::StepRetry {
            step_id,
            attempt,
            max_attempts,
            backoff_ms,
            error,
        } => format!("{step_id} attempt {attempt}/{max_attempts} failed ({error}), retrying in {backoff_ms}ms"),
        WorkflowEvent::ParallelStart { step_id, branches } => {
            format!("{step_id} with {branches} branch(es)")
        }
        WorkflowEvent::ParallelComplete { step_id, duration_ms } => {
            format!("{step_id} in {duration_ms}ms")
        }
        WorkflowEvent::ParallelFailed {
            step_id,
            failed_branches,
            ..
        } => format!("{step_id}: branches {}", failed_branches.join(", ")),
        WorkflowEvent::ConditionalMatched { step_id, case_index } => {
            format!("{step_id} case {case_index}")
        }
        WorkflowEvent::ConditionalDefault { step_id } => step_id.clone(),
        WorkflowEvent::CompensationStart { stack_size } => format!("{stack_size} entry(ies) on stack"),
        WorkflowEvent::CompensationStep {
            step_id,
            compensation_step_id,
        } => format!("{compensation_step_id} for {step_id}"),
        WorkflowEvent::CompensationComplete { compensated } => format!("{compensated} compensated"),
        WorkflowEvent::CompensationFailed { failed_steps, error } => {
            format!("{}: {error}", failed_steps.join(", "))
        }
        WorkflowEvent::WorkflowComplete {
            duration_ms,
            steps_executed,
            ..
        } => format!("{steps_executed} step(s) in {duration_ms}ms"),
        WorkflowEvent::WorkflowFailed { error, .. } => error.clone(),
    };

    format!("{kind} {detail}")
}

fn print_summary(report: &ExecutionReport, report_path: Option<&Path>) {
    println!();
    if !report.step_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Attempts"),
                Cell::new("Duration"),
                Cell::new("Detail"),
            ]);
        for result in &report.step_results {
            table.add_row(step_row(result));
        }
        println!("{table}");
        println!();
    }

    let run = &report.simulation;
    if run.success {
        println!(
            "  {} Completed {} step(s) in {}ms",
            style("*").green().bold(),
            run.steps_executed,
            run.duration
        );
    } else {
        println!(
            "  {} Workflow {} after {}ms",
            style("x").red().bold(),
            run.state,
            run.duration
        );
        if let Some(error) = &report.error {
            println!("  Error: {}", style(error).red());
        }
    }
    if !report.compensations.is_empty() {
        let failed = report
            .compensations
            .iter()
            .filter(|c| c.status == StepStatus::Failed)
            .count();
        println!(
            "  Compensations: {} run, {} failed",
            report.compensations.len(),
            failed
        );
    }
    if let Some(path) = report_path {
        println!("  Report: {}", style(path.display()).dim());
    }
    println!();
}

fn step_row(result: &StepResult) -> Vec<Cell> {
    let status = match result.status {
        StepStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
        StepStatus::Skipped => Cell::new("skipped").fg(Color::Yellow),
    };
    let detail = result
        .error
        .as_deref()
        .or(result.reason.as_deref())
        .unwrap_or("");
    vec![
        Cell::new(&result.step_id),
        status,
        Cell::new(result.attempts),
        Cell::new(format!("{}ms", result.duration_ms)),
        Cell::new(detail),
    ]
}
