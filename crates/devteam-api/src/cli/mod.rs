//! CLI command definitions and dispatch for the `devteam` binary.
//!
//! Uses clap derive macros for argument parsing. Every command operates on
//! the single persisted workflow of the configured session.

pub mod manage;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use devteam_types::workflow::RecoveryChoice;

/// Drive the planner/developer/tester/enhancer pipeline over a project.
#[derive(Parser)]
#[command(name = "devteam", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new workflow run in the foreground (Ctrl+C pauses).
    Start {
        /// Project description file (e.g. Project.md).
        #[arg(long)]
        project: PathBuf,

        /// Directory executors write into (defaults to the project's directory).
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Continue a paused workflow from its last checkpoint.
    Resume,

    /// Apply a remediation to a failed workflow and continue it.
    Recover {
        /// Remediation to apply.
        choice: ChoiceArg,
    },

    /// Show the current workflow state and checkpoints.
    Status {
        /// Print a markdown progress report instead.
        #[arg(long)]
        report: bool,
    },

    /// Show statistics of the last run.
    Stats,

    /// Discard the persisted workflow.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Roll the workflow back to a checkpoint, deleting files created after it.
    Rollback {
        /// Checkpoint index (defaults to the last checkpoint).
        #[arg(long)]
        index: Option<usize>,
    },

    /// Check that the workflow's project file and workspace are accessible.
    Validate,

    /// List the configured executors.
    Agents,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Remediation choice as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChoiceArg {
    Retry,
    Rollback,
    Skip,
    Abort,
}

impl From<ChoiceArg> for RecoveryChoice {
    fn from(choice: ChoiceArg) -> Self {
        match choice {
            ChoiceArg::Retry => RecoveryChoice::Retry,
            ChoiceArg::Rollback => RecoveryChoice::Rollback,
            ChoiceArg::Skip => RecoveryChoice::Skip,
            ChoiceArg::Abort => RecoveryChoice::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_global_flags() {
        let cli = Cli::try_parse_from([
            "devteam", "start", "--project", "Project.md", "--json", "-vv",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Start { project, workspace } => {
                assert_eq!(project, PathBuf::from("Project.md"));
                assert!(workspace.is_none());
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn start_requires_project() {
        assert!(Cli::try_parse_from(["devteam", "start"]).is_err());
    }

    #[test]
    fn parses_recover_choice() {
        let cli = Cli::try_parse_from(["devteam", "recover", "skip"]).unwrap();
        match cli.command {
            Commands::Recover { choice } => {
                assert_eq!(RecoveryChoice::from(choice), RecoveryChoice::Skip);
            }
            _ => panic!("expected recover"),
        }
        assert!(Cli::try_parse_from(["devteam", "recover", "later"]).is_err());
    }

    #[test]
    fn parses_rollback_index() {
        let cli = Cli::try_parse_from(["devteam", "rollback", "--index", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Rollback { index: Some(2) }));
    }
}
