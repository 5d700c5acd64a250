//! Executor backed by an external program.
//!
//! The program receives `{"action": ..., "context": ...}` as JSON on stdin and
//! must print one `AgentResult` JSON document on stdout. A non-zero exit, a
//! timeout or unparseable output is an error, which dispatch turns into a
//! failed step.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, bail};
use devteam_core::agent::TaskAgent;
use devteam_types::config::AgentCommandConfig;
use devteam_types::workflow::{AgentResult, WorkflowContext};
use tokio::io::AsyncWriteExt;

/// Runs a configured command for every dispatch.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    config: AgentCommandConfig,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, config: AgentCommandConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn config(&self) -> &AgentCommandConfig {
        &self.config
    }
}

impl TaskAgent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn execute(&self, ctx: &WorkflowContext, action: &str) -> anyhow::Result<AgentResult> {
        let request = serde_json::to_vec(&serde_json::json!({
            "action": action,
            "context": ctx,
        }))
        .context("Failed to serialize executor request")?;

        let mut command = tokio::process::Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if ctx.workspace_path.is_dir() {
            command.current_dir(&ctx.workspace_path);
        }

        let mut child = command.spawn().with_context(|| {
            format!(
                "Failed to spawn '{}' for agent {}",
                self.config.command, self.name
            )
        })?;

        let stdin = child.stdin.take();
        let write_request = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&request).await {
                // The program may exit without reading its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        // stdout is drained while the request is written so a program that
        // answers before reading cannot deadlock on a full pipe.
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let (written, output) = tokio::time::timeout(timeout, async {
            tokio::join!(write_request, child.wait_with_output())
        })
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "Agent {} timed out after {}s",
                self.name,
                self.config.timeout_secs
            )
        })?;
        let output = output.context("Failed to wait for executor process")?;
        written.context("Failed to write executor request")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with status {}: {}",
                self.config.command,
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8(output.stdout).context("Executor output is not valid UTF-8")?;
        let result: AgentResult = serde_json::from_str(stdout.trim())
            .with_context(|| format!("Invalid result from '{}'", self.config.command))?;

        tracing::debug!(
            agent = %self.name,
            action,
            success = result.success,
            "executor process finished"
        );
        Ok(result)
    }

    fn estimate_tokens(&self, _ctx: &WorkflowContext, _action: &str) -> u64 {
        self.config.estimated_tokens
    }
}
