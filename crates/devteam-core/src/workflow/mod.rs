//! Workflow engine core: the state machine and the services it coordinates.
//!
//! - `engine` -- run loop, pause/resume, recovery entry points, persistence
//! - `dispatch` -- executor invocation with failure and panic containment
//! - `checkpoint` -- per-step audit records
//! - `recovery` -- failure classification, retry, rollback, backups
//! - `progress` -- progress computation and text rendering
//! - `stats` -- per-run metrics

pub mod checkpoint;
pub mod dispatch;
pub mod engine;
pub mod progress;
pub mod recovery;
pub mod stats;

pub use checkpoint::CheckpointManager;
pub use dispatch::{DispatchError, Dispatcher};
pub use engine::{EngineError, WorkflowEngine, resume_target};
pub use progress::{ProgressTracker, format_duration_ms};
pub use recovery::{RecoveryError, RecoveryPolicy};
pub use stats::StatsTracker;
