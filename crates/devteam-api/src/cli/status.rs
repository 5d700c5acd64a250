//! Workflow status and statistics commands.

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::{StyledObject, style};

use devteam_core::workflow::format_duration_ms;
use devteam_types::workflow::WorkflowState;

use crate::state::AppState;

/// Display the current workflow: state, progress and checkpoints.
///
/// With `report`, prints the markdown progress report instead.
pub async fn status(state: &AppState, report: bool, json: bool) -> Result<()> {
    let engine = &state.engine;
    let ctx = engine.get_status().await;
    let stats = engine.get_stats();
    let tracker = engine.progress_tracker();

    if json {
        let progress = ctx.as_ref().map(|c| tracker.compute(c, stats.as_ref()));
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "running": engine.is_running(),
            "workflow": ctx,
            "progress": progress,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let Some(ctx) = ctx else {
        println!();
        println!(
            "  No workflow. Start one with {}",
            style("devteam start --project Project.md").cyan()
        );
        println!();
        return Ok(());
    };

    if report {
        print!("{}", tracker.progress_report(&ctx, stats.as_ref()));
        return Ok(());
    }

    let progress = tracker.compute(&ctx, stats.as_ref());

    println!();
    println!(
        "  {} devteam v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Workflow ──").dim());
    println!("  Run:       {}", style(ctx.run_id).dim());
    println!("  State:     {}", styled_state(ctx.state));
    println!("  Project:   {}", ctx.project_path.display());
    println!("  Workspace: {}", ctx.workspace_path.display());
    println!(
        "  Started:   {}",
        ctx.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Updated:   {}",
        ctx.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    println!("  {}", style("── Progress ──").dim());
    println!("  {}", tracker.progress_bar_text(&progress));
    if let Some(eta) = progress.estimated_remaining_ms.filter(|_| !ctx.state.is_terminal()) {
        println!("  ETA:       {}", format_duration_ms(eta));
    }
    if let Some(err) = &ctx.last_error {
        println!("  Error:     {}", style(err).red());
    }
    println!();

    if ctx.checkpoints.is_empty() {
        println!("  {}", style("No checkpoints yet.").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("State"),
            Cell::new("Agent"),
            Cell::new("Time"),
            Cell::new("Files"),
            Cell::new("Description"),
        ]);

    for (i, cp) in ctx.checkpoints.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(cp.state),
            Cell::new(&cp.agent),
            Cell::new(cp.timestamp.format("%H:%M:%S")),
            Cell::new(format!(
                "+{} ~{}",
                cp.files_created.len(),
                cp.files_modified.len()
            )),
            Cell::new(&cp.description),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

/// Display statistics of the current (or last) run.
pub async fn stats(state: &AppState, json: bool) -> Result<()> {
    let Some(stats) = state.engine.get_stats() else {
        if json {
            println!("null");
        } else {
            println!();
            println!("  {}", style("No statistics recorded yet.").dim());
            println!();
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let duration_ms = if stats.is_finalized() {
        stats.duration_ms
    } else {
        (Utc::now() - stats.started_at).num_milliseconds().max(0) as u64
    };

    println!();
    println!("  {}", style("── Run ──").dim());
    println!(
        "  Duration:    {}{}",
        format_duration_ms(duration_ms),
        if stats.is_finalized() { "" } else { " (running)" }
    );
    println!("  Tokens used: {}", format_tokens(stats.total_tokens_used));
    println!(
        "  Files:       {} created, {} modified",
        stats.files_created, stats.files_modified
    );
    println!("  Checkpoints: {}", stats.checkpoints_created);
    if stats.errors_encountered > 0 {
        println!("  Errors:      {}", style(stats.errors_encountered).red());
    } else {
        println!("  Errors:      0");
    }
    println!();

    if stats.agent_stats.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Agent").fg(Color::Cyan),
            Cell::new("Runs"),
            Cell::new("OK"),
            Cell::new("Failed"),
            Cell::new("Tokens"),
            Cell::new("Avg time"),
        ]);

    for (agent, s) in &stats.agent_stats {
        let avg = s.total_duration_ms.checked_div(s.execution_count).unwrap_or(0);
        let failed = if s.error_count > 0 {
            Cell::new(s.error_count).fg(Color::Red)
        } else {
            Cell::new(s.error_count)
        };
        table.add_row(vec![
            Cell::new(agent),
            Cell::new(s.execution_count),
            Cell::new(s.success_count),
            failed,
            Cell::new(format_tokens(s.total_tokens)),
            Cell::new(format_duration_ms(avg)),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}

/// State name colored by outcome.
pub(crate) fn styled_state(state: WorkflowState) -> StyledObject<&'static str> {
    let name = style(state.as_str());
    match state {
        WorkflowState::Complete => name.green().bold(),
        WorkflowState::Error => name.red().bold(),
        WorkflowState::Paused => name.yellow(),
        _ => name.cyan(),
    }
}

fn format_tokens(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
