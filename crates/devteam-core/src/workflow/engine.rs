//! Workflow engine: the state machine run loop, cancellation and persistence.
//!
//! The `WorkflowEngine` drives one run at a time through the pipeline states.
//! Each iteration resolves the current state to an executor route, dispatches
//! to it, checkpoints the result, transitions, and publishes progress.
//!
//! # Ownership
//!
//! The loop owns its `WorkflowContext` exclusively. After every mutation it
//! publishes a clone to the shared slot read by [`WorkflowEngine::get_status`]
//! and, at transitions and run exit, persists a full snapshot through the
//! repository. Readers therefore only ever see whole point-in-time copies.
//!
//! # Run flow
//!
//! 1. Acquire the run-active flag (a second caller fails without side effects).
//! 2. Loop until `Complete`/`Error`, the iteration cap, or cancellation.
//! 3. On exit: cancellation settles into `Paused`, cap exhaustion into `Error`.
//! 4. Finalize stats and persist.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use devteam_types::config::EngineConfig;
use devteam_types::error::RepositoryError;
use devteam_types::event::{WorkflowEvent, WorkflowEventKind};
use devteam_types::workflow::{
    AgentResult, AgentRoute, ProgressInfo, RecoveryChoice, WorkflowContext, WorkflowSnapshot,
    WorkflowState, WorkflowStats,
};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::agent::AgentRegistry;
use crate::event::EventChannels;
use crate::repository::WorkflowStateRepository;

use super::checkpoint::CheckpointManager;
use super::dispatch::Dispatcher;
use super::progress::ProgressTracker;
use super::recovery::{RecoveryError, RecoveryPolicy};
use super::stats::StatsTracker;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Workflow is already running")]
    AlreadyRunning,

    #[error("no workflow to {0}")]
    NoWorkflow(&'static str),

    #[error("workflow is {actual}, expected {expected}")]
    InvalidState {
        actual: WorkflowState,
        expected: WorkflowState,
    },

    #[error("recovery choice {0:?} is not available for this failure")]
    ChoiceUnavailable(RecoveryChoice),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// How the first iteration of a run dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstStep {
    Dispatch,
    /// Wrap the first dispatch in retry-with-backoff.
    Retry,
}

/// Clears the run-active flag when a run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The state a paused run continues from: the state of the last checkpoint,
/// or `InitialPlanning` when there is none.
///
/// This re-executes the last completed step rather than advancing past it.
pub fn resume_target(ctx: &WorkflowContext) -> WorkflowState {
    ctx.last_checkpoint()
        .map(|c| c.state)
        .unwrap_or(WorkflowState::InitialPlanning)
}

/// States that only exist while a loop is driving them.
fn is_in_flight(state: WorkflowState) -> bool {
    !matches!(
        state,
        WorkflowState::Idle | WorkflowState::Complete | WorkflowState::Error | WorkflowState::Paused
    )
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// The central scheduler for development pipeline runs.
///
/// Generic over `R: WorkflowStateRepository` for storage flexibility.
pub struct WorkflowEngine<R: WorkflowStateRepository> {
    repo: R,
    agents: AgentRegistry,
    recovery: RecoveryPolicy,
    progress: ProgressTracker,
    config: EngineConfig,
    channels: EventChannels,
    context: RwLock<Option<WorkflowContext>>,
    stats: StatsTracker,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl<R: WorkflowStateRepository> WorkflowEngine<R> {
    /// Create an engine with no workflow loaded.
    pub fn new(
        repo: R,
        agents: AgentRegistry,
        recovery: RecoveryPolicy,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            agents,
            recovery,
            progress: ProgressTracker::new(),
            channels: EventChannels::new(config.event_capacity),
            config,
            context: RwLock::new(None),
            stats: StatsTracker::new(),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Create an engine and load the persisted workflow for the configured
    /// session key.
    ///
    /// A persisted run that was still in flight (its process is gone) is
    /// restored as `Paused` so it can be resumed.
    pub async fn restore(
        repo: R,
        agents: AgentRegistry,
        recovery: RecoveryPolicy,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let snapshot = repo.load(&config.session_key).await?;
        let mut engine = Self::new(repo, agents, recovery, config);

        if let Some(snapshot) = snapshot {
            let mut context = snapshot.context;
            if let Some(ctx) = context.as_mut() {
                if is_in_flight(ctx.state) {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        state = %ctx.state,
                        "restored workflow was interrupted mid-run; marking as paused"
                    );
                    ctx.state = WorkflowState::Paused;
                }
                tracing::info!(run_id = %ctx.run_id, state = %ctx.state, "restored workflow state");
                engine.channels.state_changes.publish(ctx.state);
            }
            engine.stats.restore(snapshot.stats);
            *engine.context.get_mut() = context;
        }

        Ok(engine)
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Start a new run and drive it to completion.
    ///
    /// Returns `true` only if the run reached `Complete`. Fails immediately,
    /// without touching the current context, if a run is already active.
    pub async fn start(
        &self,
        project_path: impl Into<PathBuf>,
        workspace_path: impl Into<PathBuf>,
    ) -> bool {
        match self.try_start(project_path, workspace_path).await {
            Ok(success) => success,
            Err(e) => {
                tracing::warn!("start rejected: {e}");
                false
            }
        }
    }

    /// Like [`start`](Self::start), but reports a concurrent-start conflict as
    /// `EngineError::AlreadyRunning`.
    pub async fn try_start(
        &self,
        project_path: impl Into<PathBuf>,
        workspace_path: impl Into<PathBuf>,
    ) -> Result<bool, EngineError> {
        let (_guard, token) = self.acquire()?;

        let ctx = WorkflowContext::new(project_path, workspace_path, self.config.total_steps);
        self.stats.begin();
        self.publish_event(
            WorkflowEventKind::StateChange,
            ctx.state,
            "Workflow started",
            Some(json!({
                "project_path": ctx.project_path,
                "workspace_path": ctx.workspace_path,
            })),
        );

        Ok(self.run(ctx, token, FirstStep::Dispatch).await)
    }

    /// Request cooperative cancellation of the active run.
    ///
    /// Returns whether a run was active. The loop observes the request before
    /// its next dispatch; an executor call already in flight completes.
    pub fn pause(&self) -> bool {
        let token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        token.cancel();
        tracing::info!("pause requested");
        true
    }

    /// Continue a paused workflow from [`resume_target`].
    pub async fn resume(&self) -> bool {
        match self.try_resume().await {
            Ok(success) => success,
            Err(e) => {
                tracing::warn!("resume rejected: {e}");
                false
            }
        }
    }

    pub async fn try_resume(&self) -> Result<bool, EngineError> {
        let (_guard, token) = self.acquire()?;

        let mut ctx = self.current_context("resume").await?;
        if ctx.state != WorkflowState::Paused {
            return Err(EngineError::InvalidState {
                actual: ctx.state,
                expected: WorkflowState::Paused,
            });
        }

        let target = resume_target(&ctx);
        ctx.state = target;
        ctx.failed_state = None;
        ctx.retry_count = 0;
        ctx.updated_at = Utc::now();
        self.stats.begin();
        self.publish_event(
            WorkflowEventKind::UserAction,
            target,
            format!("Workflow resumed at {target}"),
            None,
        );

        Ok(self.run(ctx, token, FirstStep::Dispatch).await)
    }

    /// Apply the remediation the caller picked for a failed run, then continue
    /// the run.
    ///
    /// The choice must be one of `RecoveryPolicy::choices` for the failure.
    /// `Abort` leaves the run in `Error` and returns `false`.
    pub async fn recover(&self, choice: RecoveryChoice) -> Result<bool, EngineError> {
        let (_guard, token) = self.acquire()?;

        let mut ctx = self.current_context("recover").await?;
        if ctx.state != WorkflowState::Error {
            return Err(EngineError::InvalidState {
                actual: ctx.state,
                expected: WorkflowState::Error,
            });
        }

        let failed = ctx.failed_state;
        let options = self.recovery.classify(
            ctx.last_error.as_deref().unwrap_or_default(),
            &ctx,
            failed.map(WorkflowState::as_str).unwrap_or_default(),
        );
        if !RecoveryPolicy::choices(&options).contains(&choice) {
            return Err(EngineError::ChoiceUnavailable(choice));
        }

        let first = match choice {
            RecoveryChoice::Abort => {
                self.publish_event(
                    WorkflowEventKind::UserAction,
                    ctx.state,
                    "Workflow aborted by user",
                    None,
                );
                return Ok(false);
            }
            RecoveryChoice::Retry => {
                ctx.state = failed.ok_or(EngineError::ChoiceUnavailable(choice))?;
                FirstStep::Retry
            }
            RecoveryChoice::Skip => {
                ctx.state = failed
                    .and_then(WorkflowState::skip_to)
                    .ok_or(EngineError::ChoiceUnavailable(choice))?;
                ctx.retry_count = 0;
                FirstStep::Dispatch
            }
            RecoveryChoice::Rollback => {
                self.recovery.rollback(&mut ctx, None).await?;
                FirstStep::Dispatch
            }
        };

        ctx.last_error = None;
        ctx.failed_state = None;
        ctx.updated_at = Utc::now();
        self.stats.begin();
        self.publish_event(
            WorkflowEventKind::UserAction,
            ctx.state,
            format!("Recovering with {choice:?}"),
            Some(json!({ "choice": choice })),
        );

        Ok(self.run(ctx, token, first).await)
    }

    /// Roll the stored workflow back to checkpoint `index` (default: last)
    /// and persist it. Refused while a run is active.
    pub async fn rollback(&self, index: Option<usize>) -> Result<usize, EngineError> {
        let (_guard, _token) = self.acquire()?;

        let mut ctx = self.current_context("roll back").await?;
        let target = self.recovery.rollback(&mut ctx, index).await?;

        self.channels.state_changes.publish(ctx.state);
        self.publish_event(
            WorkflowEventKind::UserAction,
            ctx.state,
            format!("Rolled back to checkpoint {target}"),
            Some(json!({ "index": target })),
        );
        self.commit(&ctx).await;
        Ok(target)
    }

    /// Check that the stored workflow's paths are still accessible.
    pub async fn validate(&self) -> Result<bool, EngineError> {
        let ctx = self.current_context("validate").await?;
        Ok(self.recovery.validate_integrity(&ctx).await)
    }

    /// Snapshot of the current context.
    pub async fn get_status(&self) -> Option<WorkflowContext> {
        self.context.read().await.clone()
    }

    /// Snapshot of the current run's stats.
    pub fn get_stats(&self) -> Option<WorkflowStats> {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Discard the context and stats and persist the empty record.
    pub async fn reset(&self) -> Result<(), EngineError> {
        let (_guard, _token) = self.acquire()?;

        *self.context.write().await = None;
        self.stats.clear();
        self.repo
            .save(&self.config.session_key, &WorkflowSnapshot::default())
            .await?;

        self.channels.state_changes.publish(WorkflowState::Idle);
        self.publish_event(
            WorkflowEventKind::UserAction,
            WorkflowState::Idle,
            "Workflow reset by user",
            None,
        );
        tracing::info!("workflow reset");
        Ok(())
    }

    /// Cancel any active run and close every event channel.
    pub fn dispose(&self) {
        self.pause();
        self.channels.close();
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<WorkflowState> {
        self.channels.state_changes.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressInfo> {
        self.channels.progress.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.channels.events.subscribe()
    }

    pub fn recovery(&self) -> &RecoveryPolicy {
        &self.recovery
    }

    pub fn progress_tracker(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    async fn run(&self, mut ctx: WorkflowContext, token: CancellationToken, first: FirstStep) -> bool {
        let run_id = ctx.run_id;
        let max_iterations = self.config.max_iterations;
        let delay = Duration::from_millis(self.config.step_delay_ms);

        tracing::info!(
            run_id = %run_id,
            project = %ctx.project_path.display(),
            state = %ctx.state,
            "starting workflow run"
        );

        self.commit(&ctx).await;
        self.channels.state_changes.publish(ctx.state);

        let mut first = Some(first);
        let mut iterations = 0u32;

        while !ctx.state.ends_run() && iterations < max_iterations {
            if token.is_cancelled() {
                break;
            }
            iterations += 1;
            let state = ctx.state;
            tracing::debug!(run_id = %run_id, iteration = iterations, state = %state, "workflow iteration");

            let Some(route) = state.route() else {
                self.stats.record_error();
                self.fail(&mut ctx, state, format!("No agent mapped for state {state}"))
                    .await;
                break;
            };

            let result = match first.take() {
                Some(FirstStep::Retry) => {
                    let result = self.dispatch_with_retry(&ctx, route).await;
                    if !result.success {
                        ctx.retry_count = self.recovery.config().max_retries.max(1);
                    }
                    result
                }
                _ => self.dispatcher().dispatch(&ctx, route.agent, route.action).await,
            };
            if !result.success {
                self.fail(&mut ctx, state, result.message).await;
                break;
            }
            ctx.retry_count = 0;

            let checkpoint = CheckpointManager::create_checkpoint(&mut ctx, &result, &self.stats);
            self.publish_event(
                WorkflowEventKind::Checkpoint,
                state,
                format!("Checkpoint created: {}", checkpoint.description),
                Some(json!({
                    "index": ctx.checkpoints.len() - 1,
                    "agent": checkpoint.agent,
                    "files_created": checkpoint.files_created,
                    "files_modified": checkpoint.files_modified,
                })),
            );

            let next = result.effective_next_state();
            if let Some(data) = result.data {
                ctx.merge_data(route.agent, data);
            }

            if let Some(next) = next.filter(|n| *n != state) {
                ctx.state = next;
                ctx.updated_at = Utc::now();
                self.commit(&ctx).await;
                self.channels.state_changes.publish(next);
                self.publish_event(
                    WorkflowEventKind::StateChange,
                    next,
                    format!("Transitioned from {state} to {next}"),
                    None,
                );
                tracing::info!(run_id = %run_id, from = %state, to = %next, "state transition");
            }

            ctx.current_step += 1;
            ctx.updated_at = Utc::now();
            self.share(&ctx).await;
            let progress = self.progress.compute(&ctx, self.stats.snapshot().as_ref());
            self.channels.progress.publish(progress);

            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // A pause accepted during the run wins over a failure of the last step.
        let cancelled = ctx.state != WorkflowState::Complete && token.is_cancelled();
        if cancelled {
            ctx.state = WorkflowState::Paused;
            ctx.updated_at = Utc::now();
            self.channels.state_changes.publish(WorkflowState::Paused);
            self.publish_event(
                WorkflowEventKind::UserAction,
                WorkflowState::Paused,
                "Workflow cancelled by user",
                None,
            );
            tracing::info!(run_id = %run_id, step = ctx.current_step, "workflow paused");
        } else if !ctx.state.ends_run() && iterations >= max_iterations {
            self.stats.record_error();
            let state = ctx.state;
            self.fail(
                &mut ctx,
                state,
                format!("Maximum iterations reached ({max_iterations}) - possible infinite loop"),
            )
            .await;
        }

        self.stats.finalize();
        self.commit(&ctx).await;

        let success = ctx.state == WorkflowState::Complete;
        tracing::info!(
            run_id = %run_id,
            state = %ctx.state,
            steps = ctx.current_step,
            iterations,
            success,
            "workflow run finished"
        );
        success
    }

    /// Put the run into `Error` because `failed` could not complete.
    async fn fail(&self, ctx: &mut WorkflowContext, failed: WorkflowState, message: String) {
        let options = self
            .recovery
            .handle_error(&message, ctx, failed.as_str())
            .await;

        ctx.state = WorkflowState::Error;
        ctx.last_error = Some(message.clone());
        ctx.failed_state = Some(failed);
        ctx.updated_at = Utc::now();

        self.channels.state_changes.publish(WorkflowState::Error);
        self.publish_event(
            WorkflowEventKind::Error,
            WorkflowState::Error,
            message,
            Some(json!({
                "failed_state": failed,
                "recovery_options": options,
                "choices": RecoveryPolicy::choices(&options),
            })),
        );
    }

    async fn dispatch_with_retry(&self, ctx: &WorkflowContext, route: AgentRoute) -> AgentResult {
        let dispatcher = &self.dispatcher();
        let outcome = self
            .recovery
            .retry_with_backoff(
                move || async move {
                    let result = dispatcher.dispatch(ctx, route.agent, route.action).await;
                    if result.success {
                        Ok(result)
                    } else {
                        Err(anyhow::anyhow!(result.message))
                    }
                },
                route.action,
                self.recovery.config().max_retries,
            )
            .await;

        outcome.unwrap_or_else(|e| AgentResult::failure(e.to_string()))
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(&self.agents, &self.stats, &self.channels.events)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Take the run-active flag and arm a fresh cancellation token.
    fn acquire(&self) -> Result<(RunGuard<'_>, CancellationToken), EngineError> {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }
        let token = CancellationToken::new();
        *cancel = token.clone();
        Ok((RunGuard(&self.running), token))
    }

    async fn current_context(&self, op: &'static str) -> Result<WorkflowContext, EngineError> {
        self.context
            .read()
            .await
            .clone()
            .ok_or(EngineError::NoWorkflow(op))
    }

    /// Publish `ctx` to readers and persist it.
    async fn commit(&self, ctx: &WorkflowContext) {
        self.share(ctx).await;
        self.persist(ctx).await;
    }

    async fn share(&self, ctx: &WorkflowContext) {
        *self.context.write().await = Some(ctx.clone());
    }

    /// Write a full snapshot. Failures are reported, never propagated.
    async fn persist(&self, ctx: &WorkflowContext) {
        let snapshot = WorkflowSnapshot {
            context: Some(ctx.clone()),
            stats: self.stats.snapshot(),
            saved_at: None,
        };
        if let Err(e) = self.repo.save(&self.config.session_key, &snapshot).await {
            tracing::warn!(run_id = %ctx.run_id, "failed to persist workflow state: {e}");
            self.publish_event(
                WorkflowEventKind::Error,
                ctx.state,
                format!("Failed to persist workflow state: {e}"),
                None,
            );
        }
    }

    fn publish_event(
        &self,
        kind: WorkflowEventKind,
        state: WorkflowState,
        message: impl Into<String>,
        data: Option<Value>,
    ) {
        let mut event = WorkflowEvent::new(kind, state, message);
        event.data = data;
        self.channels.events.publish(event);
    }
}

impl<R: WorkflowStateRepository> std::fmt::Debug for WorkflowEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("agents", &self.agents)
            .field("running", &self.is_running())
            .field("session_key", &self.config.session_key)
            .finish()
    }
}
