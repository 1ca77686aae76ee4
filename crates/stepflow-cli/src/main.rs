//! Stepflow CLI entry point.
//!
//! Binary name: `stepflow`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,stepflow_core=debug,stepflow_infra=debug",
        _ => "trace",
    };
    stepflow_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    // Shell completions don't need configuration
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "stepflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.as_deref(), cli.offline).await;

    let result = match &cli.command {
        Commands::Compile { file, flow } => {
            cli::compile::compile_workflow(&state, file, flow.as_deref(), cli.json).await
        }
        Commands::Deps { file } => cli::deps::list_dependencies(&state, file, cli.json).await,
        Commands::Diagram {
            file,
            flow,
            format,
            output,
        } => {
            cli::diagram::render_diagram(
                &state,
                file,
                flow.as_deref(),
                *format,
                output.as_deref(),
                cli.quiet,
            )
            .await
        }
        Commands::Completions { .. } => Ok(()),
    };

    stepflow_observe::shutdown_tracing();
    result
}
