//! Checkpoint creation for completed workflow steps.
//!
//! A checkpoint records the file side effects of one successful step. The
//! checkpoint sequence is the only input rollback uses, so every file an
//! executor reports as created must land here.

use chrono::Utc;
use devteam_types::workflow::{AgentResult, Checkpoint, WorkflowContext, WorkflowState};

use super::stats::StatsTracker;

/// Executor identity recorded for states that do not dispatch.
pub const SYSTEM_AGENT: &str = "system";

/// Stateless checkpoint builder.
///
/// No internal state; the context and stats tracker are passed in by the
/// engine, which is their only writer during a run.
pub struct CheckpointManager;

impl CheckpointManager {
    /// Build a checkpoint from `result`, append it to `ctx` and count it.
    ///
    /// The checkpoint is attributed to the executor routed from the context's
    /// current state (the state that was just executed). Timestamps never go
    /// backwards within a sequence, even if the wall clock does.
    pub fn create_checkpoint(
        ctx: &mut WorkflowContext,
        result: &AgentResult,
        stats: &StatsTracker,
    ) -> Checkpoint {
        let mut timestamp = Utc::now();
        if let Some(last) = ctx.last_checkpoint() {
            timestamp = timestamp.max(last.timestamp);
        }

        let checkpoint = Checkpoint {
            state: ctx.state,
            timestamp,
            files_created: result.files_created.clone(),
            files_modified: result.files_modified.clone(),
            description: result.message.clone(),
            agent: Self::agent_for(ctx.state).to_string(),
        };

        ctx.checkpoints.push(checkpoint.clone());
        stats.record_checkpoint();

        tracing::debug!(
            run_id = %ctx.run_id,
            state = %checkpoint.state,
            agent = %checkpoint.agent,
            index = ctx.checkpoints.len() - 1,
            files_created = checkpoint.files_created.len(),
            "checkpoint created"
        );

        checkpoint
    }

    /// Executor identity for `state`, from the state table.
    pub fn agent_for(state: WorkflowState) -> &'static str {
        state.route().map(|r| r.agent).unwrap_or(SYSTEM_AGENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devteam_types::workflow::{DEVELOPER_AGENT, PLANNER_AGENT};
    use std::path::PathBuf;

    #[test]
    fn checkpoint_captures_result() {
        let stats = StatsTracker::new();
        stats.begin();
        let mut ctx = WorkflowContext::new("/p/Project.md", "/p", 10);

        let result = AgentResult::success("Plan written")
            .with_files_created(["/p/Dev_Checklist.md"])
            .with_files_modified(["/p/Project.md"]);
        let checkpoint = CheckpointManager::create_checkpoint(&mut ctx, &result, &stats);

        assert_eq!(checkpoint.state, WorkflowState::InitialPlanning);
        assert_eq!(checkpoint.agent, PLANNER_AGENT);
        assert_eq!(checkpoint.description, "Plan written");
        assert_eq!(
            checkpoint.files_created,
            vec![PathBuf::from("/p/Dev_Checklist.md")]
        );
        assert_eq!(ctx.checkpoints.len(), 1);
        assert_eq!(stats.snapshot().unwrap().checkpoints_created, 1);
    }

    #[test]
    fn checkpoints_are_ordered() {
        let stats = StatsTracker::new();
        stats.begin();
        let mut ctx = WorkflowContext::new("/p/Project.md", "/p", 10);

        for state in [
            WorkflowState::InitialPlanning,
            WorkflowState::CoreDevelopment,
            WorkflowState::CodeTesting,
        ] {
            ctx.state = state;
            CheckpointManager::create_checkpoint(&mut ctx, &AgentResult::success("ok"), &stats);
        }

        let states: Vec<_> = ctx.checkpoints.iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![
                WorkflowState::InitialPlanning,
                WorkflowState::CoreDevelopment,
                WorkflowState::CodeTesting
            ]
        );
        assert!(
            ctx.checkpoints
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
        assert_eq!(ctx.checkpoints[1].agent, DEVELOPER_AGENT);
    }

    #[test]
    fn non_dispatching_state_is_attributed_to_system() {
        assert_eq!(CheckpointManager::agent_for(WorkflowState::Complete), SYSTEM_AGENT);
    }
}
