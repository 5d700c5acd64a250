//! Task executor implementations.

pub mod command;

pub use command::CommandAgent;

use std::collections::BTreeMap;

use devteam_core::agent::{AgentRegistry, BoxTaskAgent};
use devteam_types::config::AgentCommandConfig;

/// Build a registry with one [`CommandAgent`] per `[agents.<id>]` entry.
pub fn build_registry(agents: &BTreeMap<String, AgentCommandConfig>) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for (id, config) in agents {
        tracing::debug!(agent = %id, command = %config.command, "registering command executor");
        registry.register(id.clone(), BoxTaskAgent::new(CommandAgent::new(id.clone(), config.clone())));
    }
    registry
}
