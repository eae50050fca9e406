//! Sagaflow command-line entry point.
//!
//! Binary name: `sagaflow`
//!
//! Validates workflow documents and runs them against the simulated task
//! executor, printing lifecycle events and writing a JSON report.

mod cli;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,sagaflow_core=debug",
        _ => "trace",
    };
    sagaflow_observe::init_tracing(filter, cli.otel).map_err(|e| anyhow::anyhow!(e))?;

    let outcome = match cli.command {
        Commands::Validate { file } => cli::workflow::validate_workflow(&file, cli.json),
        Commands::Run {
            file,
            inputs,
            config,
            report,
        } => {
            cli::workflow::run_workflow(
                &file,
                inputs.as_deref(),
                &config,
                report.as_deref(),
                cli.json,
                cli.quiet,
            )
            .await
        }
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "sagaflow", &mut std::io::stdout());
            Ok(true)
        }
    };

    sagaflow_observe::shutdown_tracing();

    if !outcome? {
        std::process::exit(1);
    }
    Ok(())
}
