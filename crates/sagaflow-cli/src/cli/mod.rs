//! CLI command definitions for the `sagaflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use sagaflow_infra::config::CONFIG_FILE_NAME;

/// Sagaflow - validate and simulate saga workflows.
#[derive(Parser)]
#[command(name = "sagaflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format (for scripting).
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through the OpenTelemetry stdout exporter.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a workflow document (JSON or YAML).
    Validate {
        /// Path to the workflow file.
        file: PathBuf,
    },

    /// Validate and execute a workflow against the simulated executor.
    Run {
        /// Path to the workflow file.
        file: PathBuf,

        /// Workflow inputs: inline JSON or a path to a JSON/YAML file.
        #[arg(long)]
        inputs: Option<String>,

        /// Engine configuration file.
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        config: PathBuf,

        /// Write the JSON execution report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_config_path() {
        let cli = Cli::parse_from(["sagaflow", "run", "wf.yaml"]);
        match cli.command {
            Commands::Run {
                file,
                inputs,
                config,
                report,
            } => {
                assert_eq!(file, PathBuf::from("wf.yaml"));
                assert!(inputs.is_none());
                assert_eq!(config, PathBuf::from(CONFIG_FILE_NAME));
                assert!(report.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["sagaflow", "validate", "wf.json", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
