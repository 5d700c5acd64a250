//! Foreground run commands: start, resume and recover.
//!
//! The run itself executes on a spawned task while this side renders
//! progress and turns Ctrl+C into a pause request. When a run ends in `Error`
//! on an interactive terminal, the user picks a remediation and the run
//! continues in place.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

use devteam_core::workflow::{EngineError, RecoveryPolicy, format_duration_ms};
use devteam_types::event::{WorkflowEvent, WorkflowEventKind};
use devteam_types::workflow::{
    CustomAction, RecoveryChoice, RecoveryOptions, WorkflowContext, WorkflowState,
};

use super::status::styled_state;
use crate::state::{AppState, ConcreteEngine};

/// How run output is rendered.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    fn styled(self) -> bool {
        !self.json && !self.quiet
    }

    fn interactive(self) -> bool {
        self.styled() && console::Term::stdout().is_term()
    }
}

/// Start a new run for `project`.
pub async fn start(
    state: &AppState,
    project: PathBuf,
    workspace: Option<PathBuf>,
    out: Output,
) -> Result<()> {
    if !tokio::fs::try_exists(&project).await.unwrap_or(false) {
        bail!("Project file {} not found", project.display());
    }
    let project = std::path::absolute(&project)?;
    let workspace = match workspace {
        Some(dir) => std::path::absolute(dir)?,
        None => project
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    if out.styled() {
        println!();
        println!(
            "  {} Starting workflow for {}",
            style("▶").green().bold(),
            style(project.display()).cyan()
        );
        println!("  Workspace: {}", style(workspace.display()).dim());
        println!(
            "  {}",
            style("Press Ctrl+C to pause after the current step").dim()
        );
        println!();
    }

    drive(state, out, move |engine| async move {
        engine.try_start(project, workspace).await
    })
    .await?;
    finish(state, out, true).await
}

/// Continue the paused workflow.
pub async fn resume(state: &AppState, out: Output) -> Result<()> {
    if out.styled() {
        if let Some(ctx) = state.engine.get_status().await {
            println!();
            println!(
                "  {} Resuming workflow at {}",
                style("▶").green().bold(),
                styled_state(devteam_core::workflow::resume_target(&ctx))
            );
            println!();
        }
    }

    drive(state, out, |engine| async move { engine.try_resume().await }).await?;
    finish(state, out, true).await
}

/// Apply `choice` to the failed workflow.
pub async fn recover(state: &AppState, choice: RecoveryChoice, out: Output) -> Result<()> {
    drive(state, out, move |engine| async move { engine.recover(choice).await }).await?;
    finish(state, out, choice != RecoveryChoice::Abort).await
}

// ---------------------------------------------------------------------------
// Run driver
// ---------------------------------------------------------------------------

/// Spawn `run` and render its progress until it returns.
async fn drive<F, Fut>(state: &AppState, out: Output, run: F) -> Result<bool>
where
    F: FnOnce(Arc<ConcreteEngine>) -> Fut,
    Fut: Future<Output = Result<bool, EngineError>> + Send + 'static,
{
    let engine = state.engine.clone();
    let mut progress = engine.subscribe_progress();
    let mut events = engine.subscribe_events();
    let bar = progress_bar(state.config.engine.total_steps, out)?;

    let mut handle = tokio::spawn(run(engine.clone()));
    let mut pause_requested = false;

    let outcome = loop {
        tokio::select! {
            joined = &mut handle => break joined?,
            _ = tokio::signal::ctrl_c(), if !pause_requested => {
                pause_requested = true;
                if engine.pause() {
                    bar.println(format!(
                        "  {} Pausing after the current step...",
                        style("⏸").yellow()
                    ));
                }
            }
            update = progress.recv() => match update {
                Ok(p) => {
                    bar.set_length(u64::from(p.total_steps.max(p.current_step)));
                    bar.set_position(u64::from(p.current_step));
                    bar.set_message(p.current_operation);
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "progress updates dropped");
                }
                Err(RecvError::Closed) => {}
            },
            event = events.recv() => match event {
                Ok(event) => render_event(&bar, &event, out),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "workflow events dropped");
                }
                Err(RecvError::Closed) => {}
            },
        }
    };

    bar.finish_and_clear();
    Ok(outcome?)
}

fn progress_bar(total_steps: u32, out: Output) -> Result<ProgressBar> {
    if !out.styled() {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(u64::from(total_steps));
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(bar)
}

fn render_event(bar: &ProgressBar, event: &WorkflowEvent, out: Output) {
    if !out.styled() {
        return;
    }
    match event.kind {
        WorkflowEventKind::AgentStart => bar.set_message(event.message.clone()),
        WorkflowEventKind::Checkpoint => {
            bar.println(format!("  {} {}", style("✓").green(), event.message));
        }
        WorkflowEventKind::StateChange => {
            bar.println(format!("  {} {}", style("→").cyan(), style(&event.message).dim()));
        }
        WorkflowEventKind::Error => {
            bar.println(format!("  {} {}", style("✗").red(), event.message));
        }
        WorkflowEventKind::AgentComplete | WorkflowEventKind::UserAction => {}
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Report how the run ended; on an interactive failure, offer remediation.
async fn finish(state: &AppState, out: Output, mut prompt: bool) -> Result<()> {
    loop {
        let Some(ctx) = state.engine.get_status().await else {
            bail!("No workflow state after run");
        };
        let options = (ctx.state == WorkflowState::Error).then(|| classify(state, &ctx));

        if out.json {
            let choices = options.as_ref().map(RecoveryPolicy::choices);
            let summary = serde_json::json!({
                "state": ctx.state,
                "success": ctx.state == WorkflowState::Complete,
                "current_step": ctx.current_step,
                "checkpoints": ctx.checkpoints.len(),
                "last_error": ctx.last_error,
                "failed_state": ctx.failed_state,
                "recovery_choices": choices,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        match (ctx.state, options) {
            (WorkflowState::Complete, _) => print_complete(state, &ctx, out),
            (WorkflowState::Paused, _) => {
                if !out.quiet {
                    println!(
                        "  {} Workflow paused at step {}. Run {} to continue.",
                        style("⏸").yellow().bold(),
                        ctx.current_step,
                        style("devteam resume").cyan()
                    );
                    println!();
                }
            }
            (WorkflowState::Error, Some(options)) => {
                print_failure(&ctx, &options);
                let choices = RecoveryPolicy::choices(&options);

                if prompt && out.interactive() {
                    let labels: Vec<String> =
                        choices.iter().map(|c| choice_label(*c, &ctx)).collect();
                    let selection = Select::new()
                        .with_prompt("  How do you want to recover?")
                        .items(&labels)
                        .default(0)
                        .interact()?;
                    let choice = choices[selection];
                    prompt = choice != RecoveryChoice::Abort;

                    drive(state, out, move |engine| async move {
                        engine.recover(choice).await
                    })
                    .await?;
                    continue;
                }

                let names: Vec<&str> = choices.iter().map(|c| choice_name(*c)).collect();
                println!(
                    "  Recover with: {}",
                    style(format!("devteam recover <{}>", names.join("|"))).cyan()
                );
                println!();
            }
            (other, _) => {
                if !out.quiet {
                    println!("  Workflow is {}", styled_state(other));
                }
            }
        }
        return Ok(());
    }
}

fn classify(state: &AppState, ctx: &WorkflowContext) -> RecoveryOptions {
    state.engine.recovery().classify(
        ctx.last_error.as_deref().unwrap_or_default(),
        ctx,
        ctx.failed_state.map(WorkflowState::as_str).unwrap_or_default(),
    )
}

fn print_complete(state: &AppState, ctx: &WorkflowContext, out: Output) {
    if out.quiet {
        return;
    }
    println!(
        "  {} Workflow complete after {} steps",
        style("✓").green().bold(),
        ctx.current_step
    );
    if let Some(stats) = state.engine.get_stats() {
        println!(
            "  Duration: {}   Files created: {}   Tokens: {}",
            format_duration_ms(stats.duration_ms),
            stats.files_created,
            stats.total_tokens_used
        );
    }
    println!();
}

fn print_failure(ctx: &WorkflowContext, options: &RecoveryOptions) {
    println!(
        "  {} Workflow failed{}",
        style("✗").red().bold(),
        ctx.failed_state
            .map(|s| format!(" during {}", style(s).yellow()))
            .unwrap_or_default()
    );
    if let Some(err) = &ctx.last_error {
        println!("  {}", style(err).red());
    }
    if let Some(action) = options.custom_action {
        println!("  Hint: {}", style(custom_action_hint(action)).dim());
    }
    println!();
}

fn choice_name(choice: RecoveryChoice) -> &'static str {
    match choice {
        RecoveryChoice::Retry => "retry",
        RecoveryChoice::Rollback => "rollback",
        RecoveryChoice::Skip => "skip",
        RecoveryChoice::Abort => "abort",
    }
}

fn choice_label(choice: RecoveryChoice, ctx: &WorkflowContext) -> String {
    match choice {
        RecoveryChoice::Retry => "Retry the failed step with backoff".to_string(),
        RecoveryChoice::Rollback => match ctx.last_checkpoint() {
            Some(cp) => format!("Roll back to the last checkpoint ({})", cp.state),
            None => "Roll back to the last checkpoint".to_string(),
        },
        RecoveryChoice::Skip => match ctx.failed_state.and_then(WorkflowState::skip_to) {
            Some(next) => format!("Skip this step and continue at {next}"),
            None => "Skip this step".to_string(),
        },
        RecoveryChoice::Abort => "Abort the workflow".to_string(),
    }
}

fn custom_action_hint(action: CustomAction) -> &'static str {
    match action {
        CustomAction::RecreateMissingFiles => {
            "an expected file is missing; recreate it or roll back"
        }
        CustomAction::CheckFilePermissions => "check permissions on the workspace directory",
        CustomAction::CleanTemporaryFiles => "free disk space and clean temporary files",
    }
}
