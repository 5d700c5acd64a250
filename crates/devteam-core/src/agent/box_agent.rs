//! BoxTaskAgent -- object-safe dynamic dispatch wrapper for TaskAgent.
//!
//! 1. Define an object-safe `TaskAgentDyn` trait with boxed futures
//! 2. Blanket-impl `TaskAgentDyn` for all `T: TaskAgent`
//! 3. `BoxTaskAgent` wraps `Box<dyn TaskAgentDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use devteam_types::workflow::{AgentResult, WorkflowContext};

use super::task::TaskAgent;

/// Object-safe version of [`TaskAgent`] with boxed futures.
pub trait TaskAgentDyn: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn can_execute(&self, ctx: &WorkflowContext) -> bool;

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<AgentResult>> + Send + 'a>>;

    fn estimate_tokens(&self, ctx: &WorkflowContext, action: &str) -> u64;
}

impl<T: TaskAgent> TaskAgentDyn for T {
    fn name(&self) -> &str {
        TaskAgent::name(self)
    }

    fn description(&self) -> &str {
        TaskAgent::description(self)
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        TaskAgent::can_execute(self, ctx)
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        action: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<AgentResult>> + Send + 'a>> {
        Box::pin(self.execute(ctx, action))
    }

    fn estimate_tokens(&self, ctx: &WorkflowContext, action: &str) -> u64 {
        TaskAgent::estimate_tokens(self, ctx, action)
    }
}

/// Type-erased task executor.
///
/// Since `TaskAgent` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxTaskAgent` provides equivalent methods that delegate to the
/// inner `TaskAgentDyn` trait object.
pub struct BoxTaskAgent {
    inner: Box<dyn TaskAgentDyn + Send + Sync>,
}

impl BoxTaskAgent {
    pub fn new<T: TaskAgent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        self.inner.can_execute(ctx)
    }

    pub async fn execute(&self, ctx: &WorkflowContext, action: &str) -> anyhow::Result<AgentResult> {
        self.inner.execute_boxed(ctx, action).await
    }

    pub fn estimate_tokens(&self, ctx: &WorkflowContext, action: &str) -> u64 {
        self.inner.estimate_tokens(ctx, action)
    }
}

impl std::fmt::Debug for BoxTaskAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTaskAgent")
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DEFAULT_TOKEN_ESTIMATE;

    struct EchoAgent;

    impl TaskAgent for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the action back"
        }

        async fn execute(&self, _ctx: &WorkflowContext, action: &str) -> anyhow::Result<AgentResult> {
            Ok(AgentResult::success(format!("ran {action}")))
        }
    }

    #[tokio::test]
    async fn boxed_agent_delegates() {
        let agent = BoxTaskAgent::new(EchoAgent);
        let ctx = WorkflowContext::new("/p/Project.md", "/p", 10);

        assert_eq!(agent.name(), "echo");
        assert!(agent.can_execute(&ctx));
        assert_eq!(agent.estimate_tokens(&ctx, "x"), DEFAULT_TOKEN_ESTIMATE);

        let result = agent.execute(&ctx, "initial_plan").await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "ran initial_plan");
    }

    #[test]
    fn default_can_execute_requires_both_paths() {
        let agent = BoxTaskAgent::new(EchoAgent);
        let ctx = WorkflowContext::new("", "/p", 10);
        assert!(!agent.can_execute(&ctx));

        let ctx = WorkflowContext::new("/p/Project.md", "", 10);
        assert!(!agent.can_execute(&ctx));
    }
}
