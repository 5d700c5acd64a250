//! TaskAgent trait definition.
//!
//! Uses RPITIT for `execute` (Rust 2024 edition, no async_trait macro).

use devteam_types::workflow::{AgentResult, WorkflowContext};

/// Token estimate reported by executors that cannot predict their cost.
pub const DEFAULT_TOKEN_ESTIMATE: u64 = 1000;

/// Trait for pluggable task executors (planner, developer, tester, enhancer).
///
/// `execute` may perform arbitrary slow I/O. It receives the context by shared
/// reference and must hand new values back through `AgentResult::data`.
pub trait TaskAgent: Send + Sync {
    /// Stable executor identity (e.g., "planner").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether this executor can run against `ctx`.
    ///
    /// The default requires both the project and workspace references.
    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        !ctx.project_path.as_os_str().is_empty() && !ctx.workspace_path.as_os_str().is_empty()
    }

    /// Perform `action` for the current workflow state.
    fn execute(
        &self,
        ctx: &WorkflowContext,
        action: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<AgentResult>> + Send;

    /// Best-effort cost hint for `action`.
    fn estimate_tokens(&self, _ctx: &WorkflowContext, _action: &str) -> u64 {
        DEFAULT_TOKEN_ESTIMATE
    }
}
