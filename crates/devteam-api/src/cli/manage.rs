//! Workflow maintenance commands: reset, rollback, validate, agents.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use devteam_types::workflow::{DEVELOPER_AGENT, ENHANCER_AGENT, PLANNER_AGENT, TESTER_AGENT};

use super::status::styled_state;
use crate::state::AppState;

/// Executor identities the state table dispatches to.
const PIPELINE_AGENTS: [&str; 4] = [PLANNER_AGENT, DEVELOPER_AGENT, TESTER_AGENT, ENHANCER_AGENT];

/// Discard the persisted workflow after confirmation.
pub async fn reset(state: &AppState, force: bool, json: bool) -> Result<()> {
    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Discard the current workflow and its statistics? {}",
                style("(generated files are kept)").dim()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.engine.reset().await?;

    if json {
        println!("{}", serde_json::json!({ "reset": true }));
    } else {
        println!();
        println!("  {} Workflow reset", style("✓").green().bold());
        println!();
    }
    Ok(())
}

/// Roll back to checkpoint `index` (default: the last one).
pub async fn rollback(state: &AppState, index: Option<usize>, json: bool) -> Result<()> {
    let target = state.engine.rollback(index).await?;
    let Some(ctx) = state.engine.get_status().await else {
        bail!("No workflow after rollback");
    };

    if json {
        let out = serde_json::json!({
            "checkpoint": target,
            "state": ctx.state,
            "current_step": ctx.current_step,
            "checkpoints": ctx.checkpoints.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Rolled back to checkpoint {} ({})",
        style("↶").green().bold(),
        target,
        styled_state(ctx.state)
    );
    println!("  Step: {}", ctx.current_step);
    println!(
        "  Run {} to continue from this checkpoint.",
        style("devteam resume").cyan()
    );
    println!();
    Ok(())
}

/// Check that the workflow's project file and workspace still exist.
pub async fn validate(state: &AppState, json: bool) -> Result<()> {
    let Some(ctx) = state.engine.get_status().await else {
        bail!("No workflow to validate");
    };
    let valid = state.engine.validate().await?;
    let project_ok = tokio::fs::try_exists(&ctx.project_path).await.unwrap_or(false);
    let workspace_ok = tokio::fs::try_exists(&ctx.workspace_path).await.unwrap_or(false);

    if json {
        let out = serde_json::json!({
            "valid": valid,
            "project_path": ctx.project_path,
            "project_exists": project_ok,
            "workspace_path": ctx.workspace_path,
            "workspace_exists": workspace_ok,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let mark = |ok: bool| {
            if ok {
                format!("{}", style("✓").green())
            } else {
                format!("{}", style("✗").red())
            }
        };
        println!();
        println!("  {} Project file {}", mark(project_ok), ctx.project_path.display());
        println!("  {} Workspace {}", mark(workspace_ok), ctx.workspace_path.display());
        println!();
    }

    if !valid {
        bail!("Workflow integrity check failed");
    }
    Ok(())
}

/// List configured executors and flag pipeline executors that are missing.
pub async fn agents(state: &AppState, json: bool) -> Result<()> {
    let registry = state.engine.agents();

    if json {
        let configured: Vec<_> = state
            .config
            .agents
            .iter()
            .map(|(id, cfg)| {
                serde_json::json!({
                    "id": id,
                    "command": cfg.command,
                    "args": cfg.args,
                    "description": cfg.description,
                    "timeout_secs": cfg.timeout_secs,
                })
            })
            .collect();
        let missing: Vec<&str> = PIPELINE_AGENTS
            .into_iter()
            .filter(|id| !registry.contains(id))
            .collect();
        let out = serde_json::json!({ "agents": configured, "missing": missing });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Agent").fg(Color::Cyan),
            Cell::new("Command"),
            Cell::new("Timeout"),
            Cell::new("Description"),
        ]);

    for id in PIPELINE_AGENTS {
        match state.config.agents.get(id) {
            Some(cfg) => table.add_row(vec![
                Cell::new(id),
                Cell::new(format!("{} {}", cfg.command, cfg.args.join(" ")).trim_end()),
                Cell::new(format!("{}s", cfg.timeout_secs)),
                Cell::new(&cfg.description),
            ]),
            None => table.add_row(vec![
                Cell::new(id),
                Cell::new("not configured").fg(Color::Red),
                Cell::new("-"),
                Cell::new("-"),
            ]),
        };
    }
    for (id, cfg) in &state.config.agents {
        if PIPELINE_AGENTS.contains(&id.as_str()) {
            continue;
        }
        table.add_row(vec![
            Cell::new(id),
            Cell::new(&cfg.command),
            Cell::new(format!("{}s", cfg.timeout_secs)),
            Cell::new(format!("{} (not used by the pipeline)", cfg.description)),
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}
