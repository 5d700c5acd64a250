//! Executor registry for runtime dispatch.

use std::collections::HashMap;

use super::box_agent::BoxTaskAgent;
use super::task::TaskAgent;

/// Registry of available executors, indexed by executor identity.
pub struct AgentRegistry {
    agents: HashMap<String, BoxTaskAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an executor under the given identity.
    ///
    /// If an executor with this identity already exists, it is replaced.
    pub fn register(&mut self, id: impl Into<String>, agent: BoxTaskAgent) {
        self.agents.insert(id.into(), agent);
    }

    /// Box and register a concrete executor under its own name.
    pub fn register_agent<T: TaskAgent + 'static>(&mut self, agent: T) {
        let id = agent.name().to_string();
        self.register(id, BoxTaskAgent::new(agent));
    }

    pub fn get(&self, id: &str) -> Option<&BoxTaskAgent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// All registered identities, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devteam_types::workflow::{AgentResult, WorkflowContext};

    struct NamedAgent(&'static str);

    impl TaskAgent for NamedAgent {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test agent"
        }

        async fn execute(&self, _ctx: &WorkflowContext, _action: &str) -> anyhow::Result<AgentResult> {
            Ok(AgentResult::success(self.0))
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register_agent(NamedAgent("planner"));
        registry.register("dev", BoxTaskAgent::new(NamedAgent("developer")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("planner"));
        assert_eq!(registry.get("dev").unwrap().name(), "developer");
        assert!(registry.get("tester").is_none());
        assert_eq!(registry.ids(), vec!["dev", "planner"]);
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = AgentRegistry::new();
        registry.register("planner", BoxTaskAgent::new(NamedAgent("old")));
        registry.register("planner", BoxTaskAgent::new(NamedAgent("new")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("planner").unwrap().name(), "new");
    }
}
