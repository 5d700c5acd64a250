//! Workflow domain types for devteam.
//!
//! Defines the closed set of pipeline states together with the single static
//! table that maps every state to its canonical step number, human-readable
//! operation and executor route. Everything that needs a property of a state
//! (dispatch, checkpoint attribution, rollback, progress) reads it from
//! [`WorkflowState::info`], so adding a variant fails to compile until the
//! table covers it.
//!
//! Also defines the run aggregate (`WorkflowContext`), its audit trail
//! (`Checkpoint`), the executor result contract (`AgentResult`), recovery
//! classification output (`RecoveryOptions`) and run metrics (`WorkflowStats`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Executor identities
// ---------------------------------------------------------------------------

/// Executor that writes development and enhancement plans.
pub const PLANNER_AGENT: &str = "planner";
/// Executor that generates and fixes code.
pub const DEVELOPER_AGENT: &str = "developer";
/// Executor that runs static analysis over the generated code.
pub const TESTER_AGENT: &str = "tester";
/// Executor that reviews a finished project for improvements.
pub const ENHANCER_AGENT: &str = "enhancer";

// ---------------------------------------------------------------------------
// WorkflowState + state table
// ---------------------------------------------------------------------------

/// Every state the development pipeline can be in.
///
/// Ordering between states is defined only by transitions; the enum has no
/// numeric meaning. `Complete` and `Error` end a run; `Paused` ends a run but
/// can be resumed into a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    InitialPlanning,
    CoreDevelopment,
    CodeTesting,
    BugFixing,
    ReadyForEnhancement,
    EnhancementReview,
    EnhancementPlanning,
    ImplementingEnhancement,
    Complete,
    Error,
    Paused,
}

/// The executor and action a state dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentRoute {
    pub agent: &'static str,
    pub action: &'static str,
}

/// Static properties of a [`WorkflowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    /// Canonical step number used by rollback and progress reporting.
    /// `None` for states that are not positions in the pipeline.
    pub step: Option<u32>,
    /// Human-readable description of the work done in this state.
    pub operation: &'static str,
    /// Executor route, or `None` for states that never dispatch.
    pub route: Option<AgentRoute>,
    /// Where a skipped failure of this state continues, if it can be skipped.
    pub skip_to: Option<WorkflowState>,
}

const fn route(agent: &'static str, action: &'static str) -> Option<AgentRoute> {
    Some(AgentRoute { agent, action })
}

impl WorkflowState {
    /// All states, in declaration order.
    pub const ALL: [WorkflowState; 12] = [
        Self::Idle,
        Self::InitialPlanning,
        Self::CoreDevelopment,
        Self::CodeTesting,
        Self::BugFixing,
        Self::ReadyForEnhancement,
        Self::EnhancementReview,
        Self::EnhancementPlanning,
        Self::ImplementingEnhancement,
        Self::Complete,
        Self::Error,
        Self::Paused,
    ];

    /// The state table.
    pub const fn info(self) -> StateInfo {
        match self {
            Self::Idle => StateInfo {
                step: Some(0),
                operation: "Ready to start",
                route: None,
                skip_to: None,
            },
            Self::InitialPlanning => StateInfo {
                step: Some(1),
                operation: "Creating development plan",
                route: route(PLANNER_AGENT, "initial_plan"),
                skip_to: None,
            },
            Self::CoreDevelopment => StateInfo {
                step: Some(2),
                operation: "Implementing core features",
                route: route(DEVELOPER_AGENT, "implement_features"),
                skip_to: None,
            },
            Self::CodeTesting => StateInfo {
                step: Some(3),
                operation: "Testing and analyzing code",
                route: route(TESTER_AGENT, "analyze_code"),
                skip_to: Some(Self::ReadyForEnhancement),
            },
            Self::BugFixing => StateInfo {
                step: Some(4),
                operation: "Fixing identified issues",
                route: route(DEVELOPER_AGENT, "fix_bugs"),
                skip_to: None,
            },
            Self::ReadyForEnhancement => StateInfo {
                step: Some(5),
                operation: "Preparing for enhancements",
                route: route(PLANNER_AGENT, "prepare_enhancement"),
                skip_to: None,
            },
            Self::EnhancementReview => StateInfo {
                step: Some(6),
                operation: "Reviewing for improvements",
                route: route(ENHANCER_AGENT, "review_project"),
                skip_to: Some(Self::Complete),
            },
            Self::EnhancementPlanning => StateInfo {
                step: Some(7),
                operation: "Planning enhancements",
                route: route(PLANNER_AGENT, "plan_enhancement"),
                skip_to: None,
            },
            Self::ImplementingEnhancement => StateInfo {
                step: Some(8),
                operation: "Implementing enhancements",
                route: route(DEVELOPER_AGENT, "implement_enhancement"),
                skip_to: None,
            },
            Self::Complete => StateInfo {
                step: Some(10),
                operation: "Workflow complete",
                route: None,
                skip_to: None,
            },
            Self::Error => StateInfo {
                step: None,
                operation: "Error occurred",
                route: None,
                skip_to: None,
            },
            Self::Paused => StateInfo {
                step: None,
                operation: "Workflow paused",
                route: None,
                skip_to: None,
            },
        }
    }

    /// Canonical step number for this state (see [`StateInfo::step`]).
    pub const fn canonical_step(self) -> Option<u32> {
        self.info().step
    }

    /// Human-readable operation for this state.
    pub const fn operation(self) -> &'static str {
        self.info().operation
    }

    /// Executor route for this state, if it dispatches.
    pub const fn route(self) -> Option<AgentRoute> {
        self.info().route
    }

    /// Continuation state used when a failure of this state is skipped.
    pub const fn skip_to(self) -> Option<WorkflowState> {
        self.info().skip_to
    }

    /// Whether the run loop stops when it reaches this state.
    pub const fn ends_run(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether a run is over in this state (including resumable `Paused`).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Paused)
    }

    /// Stable snake_case name, identical to the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InitialPlanning => "initial_planning",
            Self::CoreDevelopment => "core_development",
            Self::CodeTesting => "code_testing",
            Self::BugFixing => "bug_fixing",
            Self::ReadyForEnhancement => "ready_for_enhancement",
            Self::EnhancementReview => "enhancement_review",
            Self::EnhancementPlanning => "enhancement_planning",
            Self::ImplementingEnhancement => "implementing_enhancement",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown workflow state: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Immutable record of one completed workflow step and its file side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// State that was executed to produce this checkpoint.
    pub state: WorkflowState,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub files_created: Vec<PathBuf>,
    #[serde(default)]
    pub files_modified: Vec<PathBuf>,
    pub description: String,
    /// Identity of the executor that produced the step.
    pub agent: String,
}

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// The mutable aggregate describing one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// UUIDv7 assigned when the run starts.
    pub run_id: Uuid,
    pub state: WorkflowState,
    /// Path to the project description (e.g. `Project.md`).
    pub project_path: PathBuf,
    /// Directory the executors write into.
    pub workspace_path: PathBuf,
    pub current_step: u32,
    /// Estimated number of steps in the run.
    pub total_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// State whose execution put the run into `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_state: Option<WorkflowState>,
    /// Attempts already spent retrying the current failure with backoff.
    #[serde(default)]
    pub retry_count: u32,
    /// Append-only audit trail; truncated only by rollback.
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    /// Free-form values shared between steps.
    #[serde(default)]
    pub data: serde_json::Map<String, Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowContext {
    /// Create a fresh context in `InitialPlanning`.
    pub fn new(
        project_path: impl Into<PathBuf>,
        workspace_path: impl Into<PathBuf>,
        total_steps: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            state: WorkflowState::InitialPlanning,
            project_path: project_path.into(),
            workspace_path: workspace_path.into(),
            current_step: 0,
            total_steps,
            last_error: None,
            failed_state: None,
            retry_count: 0,
            checkpoints: Vec::new(),
            data: serde_json::Map::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// The most recently appended checkpoint.
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Every file recorded as created by any checkpoint, in checkpoint order.
    pub fn created_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.checkpoints.iter().flat_map(|c| c.files_created.iter())
    }

    /// Merge an executor's returned data into the shared bag.
    ///
    /// Object payloads are merged key by key; any other value is stored under
    /// `key`.
    pub fn merge_data(&mut self, key: &str, value: Value) {
        match value {
            Value::Object(map) => self.data.extend(map),
            Value::Null => {}
            other => {
                self.data.insert(key.to_string(), other);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AgentResult
// ---------------------------------------------------------------------------

/// The outcome of one executor invocation.
///
/// When `success` is false, `next_state` is ignored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub files_created: Vec<PathBuf>,
    #[serde(default)]
    pub files_modified: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<WorkflowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// Wall-clock duration, filled in by dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AgentResult {
    /// A successful result with only a message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            files_created: Vec::new(),
            files_modified: Vec::new(),
            next_state: None,
            data: None,
            tokens_used: None,
            duration_ms: None,
        }
    }

    /// A failed result with only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(message)
        }
    }

    pub fn with_next_state(mut self, state: WorkflowState) -> Self {
        self.next_state = Some(state);
        self
    }

    pub fn with_files_created<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files_created = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_files_modified<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files_modified = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The state the engine should move to, honoring the failure contract.
    pub fn effective_next_state(&self) -> Option<WorkflowState> {
        if self.success { self.next_state } else { None }
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Remediation hint attached to failures with a known cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomAction {
    RecreateMissingFiles,
    CheckFilePermissions,
    CleanTemporaryFiles,
}

/// What remediation is eligible for a classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOptions {
    pub retry: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub rollback: bool,
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_action: Option<CustomAction>,
}

/// A remediation the caller layer can choose after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryChoice {
    Retry,
    Rollback,
    Skip,
    Abort,
}

// ---------------------------------------------------------------------------
// Stats and progress
// ---------------------------------------------------------------------------

/// Per-executor counters within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub execution_count: u64,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Aggregate metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub total_tokens_used: u64,
    pub files_created: u64,
    pub files_modified: u64,
    pub errors_encountered: u64,
    pub checkpoints_created: u64,
    #[serde(default)]
    pub agent_stats: BTreeMap<String, AgentStats>,
}

impl WorkflowStats {
    /// Fresh stats for a run starting now.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
            total_tokens_used: 0,
            files_created: 0,
            files_modified: 0,
            errors_encountered: 0,
            checkpoints_created: 0,
            agent_stats: BTreeMap::new(),
        }
    }

    /// Whether the run these stats describe has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}

impl Default for WorkflowStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress of a run, published after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub current_step: u32,
    pub total_steps: u32,
    /// Rounded percentage, capped at 100.
    pub percentage: u32,
    pub current_operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
    /// Files created so far in the run.
    pub files_processed: u64,
}

// ---------------------------------------------------------------------------
// Persisted snapshot
// ---------------------------------------------------------------------------

/// The whole persisted value for one session key.
///
/// Always written as a full replacement; an empty snapshot is what `reset`
/// persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    #[serde(default)]
    pub context: Option<WorkflowContext>,
    #[serde(default)]
    pub stats: Option<WorkflowStats>,
    /// When the record was last written. Set by the repository on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl WorkflowSnapshot {
    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.stats.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_dispatching_state_has_a_step() {
        for state in WorkflowState::ALL {
            if state.route().is_some() {
                assert!(state.canonical_step().is_some(), "{state} has no step");
            }
        }
    }

    #[test]
    fn state_table_routes_match_pipeline() {
        let r = WorkflowState::InitialPlanning.route().unwrap();
        assert_eq!((r.agent, r.action), (PLANNER_AGENT, "initial_plan"));

        let r = WorkflowState::BugFixing.route().unwrap();
        assert_eq!((r.agent, r.action), (DEVELOPER_AGENT, "fix_bugs"));

        let r = WorkflowState::EnhancementReview.route().unwrap();
        assert_eq!((r.agent, r.action), (ENHANCER_AGENT, "review_project"));

        assert!(WorkflowState::Complete.route().is_none());
        assert!(WorkflowState::Paused.route().is_none());
    }

    #[test]
    fn only_review_steps_have_skip_targets() {
        assert_eq!(
            WorkflowState::CodeTesting.skip_to(),
            Some(WorkflowState::ReadyForEnhancement)
        );
        assert_eq!(
            WorkflowState::EnhancementReview.skip_to(),
            Some(WorkflowState::Complete)
        );
        assert_eq!(WorkflowState::CoreDevelopment.skip_to(), None);
        assert_eq!(WorkflowState::ImplementingEnhancement.skip_to(), None);
    }

    #[test]
    fn canonical_steps() {
        assert_eq!(WorkflowState::Idle.canonical_step(), Some(0));
        assert_eq!(WorkflowState::CodeTesting.canonical_step(), Some(3));
        assert_eq!(WorkflowState::Complete.canonical_step(), Some(10));
        assert_eq!(WorkflowState::Error.canonical_step(), None);
    }

    #[test]
    fn state_string_roundtrip() {
        for state in WorkflowState::ALL {
            let parsed: WorkflowState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, json!(state.as_str()));
        }
        assert!("bogus".parse::<WorkflowState>().is_err());
    }

    #[test]
    fn failed_result_ignores_next_state() {
        let result = AgentResult::failure("nope").with_next_state(WorkflowState::Complete);
        assert_eq!(result.effective_next_state(), None);

        let result = AgentResult::success("ok").with_next_state(WorkflowState::Complete);
        assert_eq!(result.effective_next_state(), Some(WorkflowState::Complete));
    }

    #[test]
    fn agent_result_deserializes_minimal_json() {
        let result: AgentResult =
            serde_json::from_str(r#"{"success": true, "message": "done"}"#).unwrap();
        assert!(result.success);
        assert!(result.files_created.is_empty());
        assert!(result.next_state.is_none());
    }

    #[test]
    fn merge_data_object_and_scalar() {
        let mut ctx = WorkflowContext::new("/p/Project.md", "/p", 10);
        ctx.merge_data("planner", json!({"checklist": "Dev_Checklist.md"}));
        ctx.merge_data("tester", json!(3));
        ctx.merge_data("ignored", Value::Null);

        assert_eq!(ctx.data["checklist"], json!("Dev_Checklist.md"));
        assert_eq!(ctx.data["tester"], json!(3));
        assert!(!ctx.data.contains_key("ignored"));
    }

    #[test]
    fn context_json_roundtrip_restores_timestamps() {
        let mut ctx = WorkflowContext::new("/p/Project.md", "/p", 10);
        ctx.checkpoints.push(Checkpoint {
            state: WorkflowState::InitialPlanning,
            timestamp: Utc::now(),
            files_created: vec![PathBuf::from("/p/Dev_Checklist.md")],
            files_modified: vec![],
            description: "plan".to_string(),
            agent: PLANNER_AGENT.to_string(),
        });

        let json = serde_json::to_string(&ctx).unwrap();
        let back: WorkflowContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.checkpoints[0].timestamp, ctx.checkpoints[0].timestamp);
    }
}
