//! Run envelope: run_id plus per-subscriber sequence numbers.
//! The serve layer injects these into each event before forwarding so a
//! dashboard can detect gaps and group events by run.

use serde_json::Value;

/// Envelope fields attached to each forwarded event.
#[derive(Clone, Debug, Default)]
pub struct RunEnvelope {
    /// Run ID; constant for every event of one orchestration run.
    pub run_id: Option<String>,
    /// Per-stream sequence number; monotonically increasing.
    pub seq: Option<u64>,
}

impl RunEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.run_id {
            obj.entry("run_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(seq) = self.seq {
            obj.entry("seq")
                .or_insert_with(|| Value::Number(serde_json::Number::from(seq)));
        }
    }
}

/// Sequencer for one subscriber stream: stamps run_id and the next seq.
pub struct RunSequencer {
    pub run_id: String,
    next_seq: u64,
}

impl RunSequencer {
    pub fn new(run_id: String) -> Self {
        Self { run_id, next_seq: 1 }
    }

    /// Injects the envelope into the event value and advances the sequence.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = RunEnvelope::new()
            .with_run_id(&self.run_id)
            .with_seq(self.next_seq);
        self.next_seq += 1;
        env.inject_into(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_inject_preserves_existing_keys() {
        let mut obj = serde_json::json!({"type": "token", "run_id": "keep"});
        let env = RunEnvelope::new().with_run_id("new").with_seq(7);
        env.inject_into(&mut obj);
        assert_eq!(obj["run_id"], "keep");
        assert_eq!(obj["seq"], 7);
    }

    #[test]
    fn sequencer_advances_per_event() {
        let mut seq = RunSequencer::new("run-1".to_string());
        let mut a = serde_json::json!({"type": "agent_start"});
        let mut b = serde_json::json!({"type": "agent_end"});
        seq.inject_into(&mut a);
        seq.inject_into(&mut b);
        assert_eq!(a["seq"], 1);
        assert_eq!(b["seq"], 2);
        assert_eq!(a["run_id"], "run-1");
        assert_eq!(b["run_id"], "run-1");
    }
}
