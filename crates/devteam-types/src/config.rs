//! Global configuration types for devteam.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! engine loop, the recovery policy and the external executor commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.devteam/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// External executor commands, keyed by executor identity.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentCommandConfig>,
}

/// Run loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Iterations after which a run is forced into `Error`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Initial estimate of steps in a run.
    #[serde(default = "default_total_steps")]
    pub total_steps: u32,

    /// Yield between loop iterations, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Broadcast capacity of each event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Key of the persisted workflow record.
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_max_iterations() -> u32 {
    50
}

fn default_total_steps() -> u32 {
    10
}

fn default_step_delay_ms() -> u64 {
    100
}

fn default_event_capacity() -> usize {
    256
}

fn default_session_key() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            total_steps: default_total_steps(),
            step_delay_ms: default_step_delay_ms(),
            event_capacity: default_event_capacity(),
            session_key: default_session_key(),
        }
    }
}

/// Error recovery policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Total attempts made by retry-with-backoff.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each backoff.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,

    /// Operation names that may be skipped after a failure.
    #[serde(default = "default_skippable_operations")]
    pub skippable_operations: Vec<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    1000
}

fn default_backup_suffix() -> String {
    ".backup".to_string()
}

fn default_skippable_operations() -> Vec<String> {
    ["web_testing", "enhancement_review", "documentation_update", "code_testing"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            backup_suffix: default_backup_suffix(),
            skippable_operations: default_skippable_operations(),
        }
    }
}

/// An external program that implements one executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommandConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,

    /// Cost hint reported before execution.
    #[serde(default = "default_estimated_tokens")]
    pub estimated_tokens: u64,
}

fn default_agent_timeout_secs() -> u64 {
    600
}

fn default_estimated_tokens() -> u64 {
    1000
}
