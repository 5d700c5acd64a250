//! Error recovery policy: failure classification, retry with backoff,
//! checkpoint rollback, file backups and integrity validation.
//!
//! The policy never decides on its own which remediation to apply. It reports
//! what is eligible ([`RecoveryOptions`]) and performs the mechanics of the
//! remediation the caller layer picks.

use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use devteam_types::config::RecoveryConfig;
use devteam_types::workflow::{
    CustomAction, RecoveryChoice, RecoveryOptions, WorkflowContext, WorkflowState,
};
use rand::Rng;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Case-insensitive signatures of transient failures.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "econnreset",
    "connection reset",
    "rate limit",
    "temporarily unavailable",
];

/// Known causes with a remediation hint.
const CUSTOM_ACTIONS: &[(&str, CustomAction)] = &[
    ("file not found", CustomAction::RecreateMissingFiles),
    ("permission denied", CustomAction::CheckFilePermissions),
    ("disk space", CustomAction::CleanTemporaryFiles),
];

// ---------------------------------------------------------------------------
// RecoveryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("{operation} failed after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("No checkpoints available for rollback")]
    NoCheckpoints,

    #[error("Checkpoint at index {0} not found")]
    CheckpointNotFound(usize),
}

// ---------------------------------------------------------------------------
// RecoveryPolicy
// ---------------------------------------------------------------------------

/// Explicitly constructed recovery service, one per engine.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    config: RecoveryConfig,
    error_log: Option<PathBuf>,
}

impl RecoveryPolicy {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            error_log: None,
        }
    }

    /// Append a JSON record for every handled error to `path`.
    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    /// Decide which remediations are eligible for `error` raised by
    /// `operation` against `ctx`.
    ///
    /// A transient failure stops being retryable once `ctx.retry_count`
    /// reaches `max_retries`: an exhausted retry is permanent.
    pub fn classify(&self, error: &str, ctx: &WorkflowContext, operation: &str) -> RecoveryOptions {
        let message = error.to_lowercase();
        let operation = operation.to_lowercase();
        let max_retries = self.config.max_retries;

        RecoveryOptions {
            retry: ctx.retry_count < max_retries
                && TRANSIENT_SIGNATURES.iter().any(|sig| message.contains(sig)),
            retry_count: ctx.retry_count,
            max_retries,
            rollback: !ctx.checkpoints.is_empty(),
            skip: self
                .config
                .skippable_operations
                .iter()
                .any(|op| operation.contains(&op.to_lowercase())),
            custom_action: CUSTOM_ACTIONS
                .iter()
                .find(|(sig, _)| message.contains(sig))
                .map(|(_, action)| *action),
        }
    }

    /// Classify `error` and append it to the error log.
    pub async fn handle_error(
        &self,
        error: &str,
        ctx: &WorkflowContext,
        operation: &str,
    ) -> RecoveryOptions {
        let options = self.classify(error, ctx, operation);
        tracing::error!(
            run_id = %ctx.run_id,
            operation,
            state = %ctx.state,
            retry = options.retry,
            rollback = options.rollback,
            skip = options.skip,
            "workflow error: {error}"
        );
        self.append_error_log(error, ctx, operation, &options).await;
        options
    }

    /// Remediation choices eligible under `options`, in presentation order.
    /// `Abort` is always last.
    pub fn choices(options: &RecoveryOptions) -> Vec<RecoveryChoice> {
        let mut choices = Vec::with_capacity(4);
        if options.retry && options.retry_count < options.max_retries {
            choices.push(RecoveryChoice::Retry);
        }
        if options.rollback {
            choices.push(RecoveryChoice::Rollback);
        }
        if options.skip {
            choices.push(RecoveryChoice::Skip);
        }
        choices.push(RecoveryChoice::Abort);
        choices
    }

    async fn append_error_log(
        &self,
        error: &str,
        ctx: &WorkflowContext,
        operation: &str,
        options: &RecoveryOptions,
    ) {
        let Some(path) = &self.error_log else {
            return;
        };

        let record = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "operation": operation,
            "workflow_state": ctx.state,
            "current_step": ctx.current_step,
            "error": error,
            "recovery_options": options,
        });

        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(format!("{record}\n").as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), "failed to write error log: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Retry
    // -----------------------------------------------------------------------

    /// Run `op` up to `max_retries` times in total, sleeping
    /// `base_delay * 2^(attempt-1) + jitter` between attempts.
    ///
    /// A `max_retries` of zero still makes one attempt.
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        mut op: F,
        name: &str,
        max_retries: u32,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation = name, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    tracing::warn!(
                        operation = name,
                        attempt,
                        max_attempts = attempts,
                        "attempt failed: {last_error}"
                    );
                    if attempt == attempts {
                        break;
                    }
                    let delay = self.backoff_delay(attempt) + Duration::from_millis(self.jitter_ms());
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(RecoveryError::RetriesExhausted {
            operation: name.to_string(),
            attempts,
            last_error,
        })
    }

    /// Backoff before the attempt after `attempt` (1-based), without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(factor))
    }

    fn jitter_ms(&self) -> u64 {
        if self.config.max_jitter_ms == 0 {
            return 0;
        }
        rand::rng().random_range(0..self.config.max_jitter_ms)
    }

    // -----------------------------------------------------------------------
    // Rollback
    // -----------------------------------------------------------------------

    /// Roll `ctx` back to checkpoint `index` (default: the last one).
    ///
    /// Deletes every file recorded as created by later checkpoints, restores
    /// the checkpoint's state and canonical step, clears the last error and
    /// truncates the checkpoint sequence. Returns the target index. Files that
    /// are already gone are skipped; other deletion failures are logged and do
    /// not stop the rollback.
    pub async fn rollback(
        &self,
        ctx: &mut WorkflowContext,
        index: Option<usize>,
    ) -> Result<usize, RecoveryError> {
        if ctx.checkpoints.is_empty() {
            return Err(RecoveryError::NoCheckpoints);
        }
        let target = index.unwrap_or(ctx.checkpoints.len() - 1);
        let Some(checkpoint) = ctx.checkpoints.get(target) else {
            return Err(RecoveryError::CheckpointNotFound(target));
        };
        let state = checkpoint.state;

        tracing::info!(
            run_id = %ctx.run_id,
            index = target,
            state = %state,
            "rolling back to checkpoint: {}",
            checkpoint.description
        );

        for later in &ctx.checkpoints[target + 1..] {
            for path in &later.files_created {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => tracing::info!(path = %path.display(), "removed file"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!(path = %path.display(), "file already absent");
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "failed to remove file: {e}");
                    }
                }
            }
        }

        ctx.state = state;
        ctx.current_step = canonical_step(state);
        ctx.last_error = None;
        ctx.failed_state = None;
        ctx.retry_count = 0;
        ctx.checkpoints.truncate(target + 1);
        ctx.updated_at = Utc::now();

        Ok(target)
    }

    // -----------------------------------------------------------------------
    // Backups
    // -----------------------------------------------------------------------

    /// Copy every existing file in `paths` to `<path><suffix>`.
    ///
    /// Returns the backup paths that were written. Missing files and copy
    /// failures are skipped.
    pub async fn backup(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut backups = Vec::with_capacity(paths.len());
        for path in paths {
            if !is_file(path).await {
                continue;
            }
            let backup = with_suffix(path, &self.config.backup_suffix);
            match tokio::fs::copy(path, &backup).await {
                Ok(_) => backups.push(backup),
                Err(e) => tracing::warn!(path = %path.display(), "failed to back up file: {e}"),
            }
        }
        backups
    }

    /// Copy each backup over its original and delete the backup.
    ///
    /// Returns `true` only if every backup was restored.
    pub async fn restore(&self, backups: &[PathBuf]) -> bool {
        let mut all_restored = true;
        for backup in backups {
            if !is_file(backup).await {
                continue;
            }
            let Some(original) = strip_suffix(backup, &self.config.backup_suffix) else {
                tracing::error!(path = %backup.display(), "backup path lacks the backup suffix");
                all_restored = false;
                continue;
            };
            let result = async {
                tokio::fs::copy(backup, &original).await?;
                tokio::fs::remove_file(backup).await
            }
            .await;
            if let Err(e) = result {
                tracing::error!(path = %backup.display(), "failed to restore backup: {e}");
                all_restored = false;
            }
        }
        all_restored
    }

    // -----------------------------------------------------------------------
    // Integrity
    // -----------------------------------------------------------------------

    /// Check that the project file and workspace directory are still
    /// accessible. Missing checkpoint files are reported but not fatal.
    pub async fn validate_integrity(&self, ctx: &WorkflowContext) -> bool {
        if tokio::fs::metadata(&ctx.project_path).await.is_err() {
            tracing::error!(path = %ctx.project_path.display(), "project file is missing");
            return false;
        }

        let workspace_ok = tokio::fs::metadata(&ctx.workspace_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !workspace_ok {
            tracing::error!(
                path = %ctx.workspace_path.display(),
                "workspace directory is not accessible"
            );
            return false;
        }

        for path in ctx.created_files() {
            if tokio::fs::metadata(path).await.is_err() {
                tracing::warn!(path = %path.display(), "checkpoint file missing");
            }
        }

        true
    }
}

/// Canonical step for rollback; states outside the pipeline map to 0.
fn canonical_step(state: WorkflowState) -> u32 {
    state.canonical_step().unwrap_or(0)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let rest = path
        .as_os_str()
        .as_encoded_bytes()
        .strip_suffix(suffix.as_bytes())
        .filter(|rest| !rest.is_empty())?;
    // SAFETY: `rest` comes from `as_encoded_bytes` and is split immediately
    // before the non-empty UTF-8 string `suffix`.
    let original = unsafe { OsStr::from_encoded_bytes_unchecked(rest) };
    Some(PathBuf::from(original))
}
