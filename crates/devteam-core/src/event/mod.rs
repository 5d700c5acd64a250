//! Event channels for workflow observers.
//!
//! The engine publishes on three independent channels: state changes,
//! progress updates and generic lifecycle events. Each is an [`EventBus`]
//! backed by a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;

use devteam_types::event::WorkflowEvent;
use devteam_types::workflow::{ProgressInfo, WorkflowState};

/// The three channels exposed to observers.
#[derive(Debug)]
pub struct EventChannels {
    pub state_changes: EventBus<WorkflowState>,
    pub progress: EventBus<ProgressInfo>,
    pub events: EventBus<WorkflowEvent>,
}

impl EventChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            state_changes: EventBus::new(capacity),
            progress: EventBus::new(capacity),
            events: EventBus::new(capacity),
        }
    }

    /// Close all three channels.
    pub fn close(&self) {
        self.state_changes.close();
        self.progress.close();
        self.events.close();
    }
}
