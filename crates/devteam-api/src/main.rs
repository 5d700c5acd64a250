//! devteam CLI entry point.
//!
//! Binary name: `devteam`
//!
//! Parses CLI arguments, initializes tracing, the database and the workflow
//! engine, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, manage, run, status};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    devteam_observe::tracing_setup::init_tracing(log_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!(e))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "devteam", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let out = run::Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Start { project, workspace } => run::start(&state, project, workspace, out).await,
        Commands::Resume => run::resume(&state, out).await,
        Commands::Recover { choice } => run::recover(&state, choice.into(), out).await,
        Commands::Status { report } => status::status(&state, report, cli.json).await,
        Commands::Stats => status::stats(&state, cli.json).await,
        Commands::Reset { force } => manage::reset(&state, force, cli.json).await,
        Commands::Rollback { index } => manage::rollback(&state, index, cli.json).await,
        Commands::Validate => manage::validate(&state, cli.json).await,
        Commands::Agents => manage::agents(&state, cli.json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    state.engine.dispose();
    devteam_observe::tracing_setup::shutdown_tracing();
    result
}

/// Default tracing directive for the verbosity flags (`RUST_LOG` overrides it).
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,devteam_core=debug,devteam_infra=debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "warn");
        assert!(log_filter(1, false).contains("devteam_core=debug"));
        assert_eq!(log_filter(3, true), "trace");
    }
}
