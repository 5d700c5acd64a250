//! Task executor capability contract.
//!
//! Every executor the engine dispatches to implements [`TaskAgent`]. Concrete
//! executors live in devteam-infra (e.g. `CommandAgent`); the engine only
//! sees them through [`BoxTaskAgent`] in an [`AgentRegistry`].

pub mod box_agent;
pub mod registry;
pub mod task;

pub use box_agent::BoxTaskAgent;
pub use registry::AgentRegistry;
pub use task::{DEFAULT_TOKEN_ESTIMATE, TaskAgent};
