//! CLI command definitions for the `stepflow` binary.
//!
//! Uses clap derive macros for argument parsing. Every command takes a
//! workflow file, compiles it, and renders one view of the result.

pub mod compile;
pub mod deps;
pub mod diagram;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Compile YAML step trees into resolved graphs and process diagrams.
#[derive(Parser)]
#[command(name = "stepflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./stepflow.toml, then the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Never contact the package registry; use pinned or default ranges.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true, hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a workflow and show every step with its resolved successor.
    Compile {
        /// Workflow YAML file.
        file: PathBuf,

        /// Only show steps of this flow.
        #[arg(long)]
        flow: Option<String>,
    },

    /// List the external libraries a workflow depends on.
    #[command(alias = "dependencies")]
    Deps {
        /// Workflow YAML file.
        file: PathBuf,
    },

    /// Render a workflow as a process diagram.
    Diagram {
        /// Workflow YAML file.
        file: PathBuf,

        /// Flow to render (all flows when omitted).
        #[arg(long)]
        flow: Option<String>,

        /// Output format.
        #[arg(long, short, value_enum, default_value_t = DiagramFormat::Bpmn)]
        format: DiagramFormat,

        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiagramFormat {
    /// BPMN 2.0 XML with diagram interchange.
    Bpmn,
    /// The positioned diagram model as JSON.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_diagram_with_defaults() {
        let cli = Cli::try_parse_from(["stepflow", "diagram", "flow.yaml"]).unwrap();
        match cli.command {
            Commands::Diagram { file, flow, format, output } => {
                assert_eq!(file, PathBuf::from("flow.yaml"));
                assert!(flow.is_none());
                assert_eq!(format, DiagramFormat::Bpmn);
                assert!(output.is_none());
            }
            _ => panic!("expected diagram command"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "stepflow", "deps", "flow.yaml", "--offline", "--json", "-vv",
        ])
        .unwrap();
        assert!(cli.offline);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn rejects_unknown_format() {
        let result = Cli::try_parse_from(["stepflow", "diagram", "flow.yaml", "-f", "svg"]);
        assert!(result.is_err());
    }

    #[test]
    fn verify_command_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
