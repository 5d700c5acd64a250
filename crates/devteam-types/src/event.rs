//! Lifecycle event types for the devteam event channels.
//!
//! `WorkflowEvent` is the generic lifecycle notification. It is Clone + Send +
//! Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::WorkflowState;

/// Kinds of lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    StateChange,
    AgentStart,
    AgentComplete,
    Error,
    Checkpoint,
    UserAction,
}

/// One lifecycle notification, stamped with the state at time of publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: WorkflowEventKind,
    pub state: WorkflowState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind, state: WorkflowState, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            state,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_kind_as_type() {
        let event = WorkflowEvent::new(
            WorkflowEventKind::UserAction,
            WorkflowState::Paused,
            "Workflow cancelled by user",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_action");
        assert_eq!(json["state"], "paused");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn event_with_data() {
        let event = WorkflowEvent::new(
            WorkflowEventKind::AgentComplete,
            WorkflowState::CodeTesting,
            "done",
        )
        .with_data(json!({"agent": "tester"}));
        assert_eq!(event.data.unwrap()["agent"], "tester");
    }
}
