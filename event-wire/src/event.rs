//! Wire-level event types: the discriminated kind and the full envelope.
//! Every event delivered to a subscriber serializes to
//! `{"type": ..., "agent": ..., "data": {...}, "timestamp": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminator for one orchestration event.
///
/// Serializes as `snake_case` into the `type` field of the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    Token,
    CodeWritten,
    FileCreated,
    Execution,
    ExecutionStep,
    Retry,
    Error,
    Complete,
    PlanCreated,
    ToolExecuted,
    CodeReviewed,
}

impl EventKind {
    /// The wire string for this kind (same value serde writes into `type`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStart => "agent_start",
            EventKind::AgentEnd => "agent_end",
            EventKind::Token => "token",
            EventKind::CodeWritten => "code_written",
            EventKind::FileCreated => "file_created",
            EventKind::Execution => "execution",
            EventKind::ExecutionStep => "execution_step",
            EventKind::Retry => "retry",
            EventKind::Error => "error",
            EventKind::Complete => "complete",
            EventKind::PlanCreated => "plan_created",
            EventKind::ToolExecuted => "tool_executed",
            EventKind::CodeReviewed => "code_reviewed",
        }
    }
}

/// One orchestration event as it crosses the wire.
///
/// `timestamp` is Unix seconds with sub-second precision, matching the
/// dashboard contract. `data` is an event-specific JSON object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub agent: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: f64,
}

impl WireEvent {
    /// Builds an event stamped with the current wall-clock time.
    pub fn now(kind: EventKind, agent: impl Into<String>, data: Value) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            kind,
            agent: agent.into(),
            data,
            timestamp,
        }
    }

    /// Serializes this event to a JSON value.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Serializes this event to the JSON line sent to subscribers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the envelope serializes with `type` as the discriminator
    /// and the documented field names.
    #[test]
    fn wire_event_serializes_envelope_shape() {
        let ev = WireEvent {
            kind: EventKind::AgentStart,
            agent: "coder".to_string(),
            data: serde_json::json!({"task": "hello"}),
            timestamp: 1234.5,
        };
        let value = ev.to_value().unwrap();
        assert_eq!(value["type"], "agent_start");
        assert_eq!(value["agent"], "coder");
        assert_eq!(value["data"]["task"], "hello");
        assert_eq!(value["timestamp"], 1234.5);
    }

    /// **Scenario**: every kind round-trips through its wire string.
    #[test]
    fn event_kind_as_str_matches_serde() {
        let kinds = [
            EventKind::AgentStart,
            EventKind::AgentEnd,
            EventKind::Token,
            EventKind::CodeWritten,
            EventKind::FileCreated,
            EventKind::Execution,
            EventKind::ExecutionStep,
            EventKind::Retry,
            EventKind::Error,
            EventKind::Complete,
            EventKind::PlanCreated,
            EventKind::ToolExecuted,
            EventKind::CodeReviewed,
        ];
        for kind in kinds {
            let as_json = serde_json::to_value(kind).unwrap();
            assert_eq!(as_json, kind.as_str());
        }
    }

    /// **Scenario**: `now` stamps a positive wall-clock timestamp.
    #[test]
    fn wire_event_now_stamps_timestamp() {
        let ev = WireEvent::now(EventKind::Complete, "engine", serde_json::json!({}));
        assert!(ev.timestamp > 0.0);
    }
}
