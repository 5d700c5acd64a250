//! Executor dispatch: the boundary between the engine and task executors.
//!
//! Dispatch never lets an executor failure escape. Missing executors,
//! ineligible executors, returned errors and panics all come back as a failed
//! [`AgentResult`] whose message names the executor.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use devteam_types::event::{WorkflowEvent, WorkflowEventKind};
use devteam_types::workflow::{AgentResult, WorkflowContext};
use futures_util::FutureExt;
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;

use crate::agent::AgentRegistry;
use crate::event::EventBus;

use super::stats::StatsTracker;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Agent {0} not found")]
    AgentNotFound(String),

    #[error("Agent {0} cannot execute in current context")]
    CannotExecute(String),

    #[error("Agent {agent} failed: {message}")]
    Failed { agent: String, message: String },

    #[error("Agent {agent} panicked: {message}")]
    Panicked { agent: String, message: String },
}

/// Borrowed view of the engine services dispatch needs.
pub struct Dispatcher<'a> {
    agents: &'a AgentRegistry,
    stats: &'a StatsTracker,
    events: &'a EventBus<WorkflowEvent>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        agents: &'a AgentRegistry,
        stats: &'a StatsTracker,
        events: &'a EventBus<WorkflowEvent>,
    ) -> Self {
        Self {
            agents,
            stats,
            events,
        }
    }

    /// Run `action` on executor `agent_id` against `ctx`.
    pub async fn dispatch(&self, ctx: &WorkflowContext, agent_id: &str, action: &str) -> AgentResult {
        let Some(agent) = self.agents.get(agent_id) else {
            return self.reject(ctx, DispatchError::AgentNotFound(agent_id.to_string()));
        };
        if !agent.can_execute(ctx) {
            return self.reject(ctx, DispatchError::CannotExecute(agent_id.to_string()));
        }

        let estimated_tokens = agent.estimate_tokens(ctx, action);
        tracing::info!(
            run_id = %ctx.run_id,
            agent = agent_id,
            action,
            estimated_tokens,
            "dispatching executor"
        );
        self.events.publish(
            WorkflowEvent::new(
                WorkflowEventKind::AgentStart,
                ctx.state,
                format!("Starting {agent_id}: {action}"),
            )
            .with_data(json!({
                "agent": agent_id,
                "action": action,
                "estimated_tokens": estimated_tokens,
            })),
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(agent.execute(ctx, action))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => AgentResult::failure(
                DispatchError::Failed {
                    agent: agent_id.to_string(),
                    message: format!("{e:#}"),
                }
                .to_string(),
            ),
            Err(panic) => AgentResult::failure(
                DispatchError::Panicked {
                    agent: agent_id.to_string(),
                    message: panic_message(panic.as_ref()),
                }
                .to_string(),
            ),
        };
        result.duration_ms = Some(duration_ms);
        self.stats.record_execution(agent_id, &result, duration_ms);

        let data = json!({
            "agent": agent_id,
            "action": action,
            "duration_ms": duration_ms,
            "tokens_used": result.tokens_used,
            "files_created": result.files_created.len(),
            "files_modified": result.files_modified.len(),
        });

        if result.success {
            tracing::info!(
                run_id = %ctx.run_id,
                agent = agent_id,
                action,
                duration_ms,
                "executor completed"
            );
            self.events.publish(
                WorkflowEvent::new(
                    WorkflowEventKind::AgentComplete,
                    ctx.state,
                    format!("{agent_id} completed: {}", result.message),
                )
                .with_data(data),
            );
        } else {
            tracing::error!(
                run_id = %ctx.run_id,
                agent = agent_id,
                action,
                duration_ms,
                "executor failed: {}",
                result.message
            );
            self.events.publish(
                WorkflowEvent::new(WorkflowEventKind::Error, ctx.state, result.message.clone())
                    .with_data(data),
            );
        }

        result
    }

    fn reject(&self, ctx: &WorkflowContext, err: DispatchError) -> AgentResult {
        tracing::error!(run_id = %ctx.run_id, state = %ctx.state, "{err}");
        self.stats.record_error();
        self.events.publish(WorkflowEvent::new(
            WorkflowEventKind::Error,
            ctx.state,
            err.to_string(),
        ));
        AgentResult::failure(err.to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TaskAgent;
    use devteam_types::workflow::WorkflowState;

    struct ScriptedAgent {
        name: &'static str,
        eligible: bool,
        behavior: Behavior,
    }

    enum Behavior {
        Succeed,
        Fail,
        Error,
        Panic,
    }

    impl TaskAgent for ScriptedAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "scripted"
        }

        fn can_execute(&self, _ctx: &WorkflowContext) -> bool {
            self.eligible
        }

        async fn execute(&self, _ctx: &WorkflowContext, action: &str) -> anyhow::Result<AgentResult> {
            match self.behavior {
                Behavior::Succeed => Ok(AgentResult::success(format!("{action} ok"))
                    .with_files_created(["a.md"])
                    .with_tokens(42)),
                Behavior::Fail => Ok(AgentResult::failure("plan rejected")),
                Behavior::Error => Err(anyhow::anyhow!("network unreachable")),
                Behavior::Panic => panic!("executor exploded"),
            }
        }
    }

    fn registry(behavior: Behavior, eligible: bool) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        registry.register_agent(ScriptedAgent {
            name: "planner",
            eligible,
            behavior,
        });
        registry
    }

    fn setup() -> (StatsTracker, EventBus<WorkflowEvent>, WorkflowContext) {
        let stats = StatsTracker::new();
        stats.begin();
        (
            stats,
            EventBus::new(16),
            WorkflowContext::new("/p/Project.md", "/p", 10),
        )
    }

    #[tokio::test]
    async fn success_updates_stats_and_events() {
        let (stats, events, ctx) = setup();
        let agents = registry(Behavior::Succeed, true);
        let mut rx = events.subscribe();

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(result.success);
        assert_eq!(result.message, "initial_plan ok");
        assert!(result.duration_ms.is_some());

        let snapshot = stats.snapshot().unwrap();
        assert_eq!(snapshot.agent_stats["planner"].success_count, 1);
        assert_eq!(snapshot.total_tokens_used, 42);
        assert_eq!(snapshot.files_created, 1);

        assert_eq!(rx.recv().await.unwrap().kind, WorkflowEventKind::AgentStart);
        let done = rx.recv().await.unwrap();
        assert_eq!(done.kind, WorkflowEventKind::AgentComplete);
        assert_eq!(done.state, WorkflowState::InitialPlanning);
    }

    #[tokio::test]
    async fn missing_agent_fails_fast() {
        let (stats, events, ctx) = setup();
        let agents = AgentRegistry::new();
        let mut rx = events.subscribe();

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "Agent planner not found");
        assert_eq!(stats.snapshot().unwrap().errors_encountered, 1);
        assert_eq!(rx.recv().await.unwrap().kind, WorkflowEventKind::Error);
    }

    #[tokio::test]
    async fn ineligible_agent_is_not_executed() {
        let (stats, events, ctx) = setup();
        let agents = registry(Behavior::Panic, false);

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "Agent planner cannot execute in current context");
        assert!(stats.snapshot().unwrap().agent_stats.is_empty());
    }

    #[tokio::test]
    async fn reported_failure_counts_as_error() {
        let (stats, events, ctx) = setup();
        let agents = registry(Behavior::Fail, true);

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "plan rejected");
        let snapshot = stats.snapshot().unwrap();
        assert_eq!(snapshot.agent_stats["planner"].error_count, 1);
        assert_eq!(snapshot.errors_encountered, 1);
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_result() {
        let (stats, events, ctx) = setup();
        let agents = registry(Behavior::Error, true);

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(!result.success);
        assert_eq!(result.message, "Agent planner failed: network unreachable");
    }

    #[tokio::test]
    async fn executor_panic_is_contained() {
        let (stats, events, ctx) = setup();
        let agents = registry(Behavior::Panic, true);

        let result = Dispatcher::new(&agents, &stats, &events)
            .dispatch(&ctx, "planner", "initial_plan")
            .await;

        assert!(!result.success);
        assert!(result.message.contains("Agent planner panicked"));
        assert!(result.message.contains("executor exploded"));
        assert_eq!(stats.snapshot().unwrap().agent_stats["planner"].error_count, 1);
    }
}
