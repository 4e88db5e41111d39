//! Event fan-out: one process-wide bus, any number of subscribers.
//!
//! Each emit serialises the event once and makes exactly one non-blocking
//! send attempt per sink. A closed sink is removed; a full sink misses that
//! event but keeps its subscription; no sink can affect another. Events from
//! a single agent reach every healthy sink in emission order (one emitter,
//! FIFO channels); there is no cross-agent ordering guarantee.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use event_wire::{EventKind, WireEvent};

/// Opaque subscriber handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<String>,
}

/// Fan-out bus for orchestration events.
///
/// Subscribers receive serialized event lines (the §4.1 envelope as one JSON
/// string) through bounded channels. Mutation of the subscriber list is
/// guarded by a mutex; emission iterates over a copy so a subscribe or
/// unsubscribe during delivery cannot deadlock or skip sinks.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    emitted: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            emitted: AtomicU64::new(0),
        }
    }

    /// Registers a sink with the given channel capacity. Returns the handle
    /// and the receiving end.
    pub fn subscribe(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscribers.lock().expect("subscriber lock");
        subs.push(Subscriber { id, tx });
        debug!(subscribers = subs.len(), "event subscriber connected");
        (id, rx)
    }

    /// Removes a sink. Dropping the receiver has the same effect on the next
    /// emit.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.lock().expect("subscriber lock");
        subs.retain(|s| s.id != id);
        debug!(subscribers = subs.len(), "event subscriber removed");
    }

    /// Current number of registered sinks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock").len()
    }

    /// Total number of events emitted since construction.
    pub fn events_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Broadcasts one event to every sink: serialise once, one `try_send`
    /// attempt per sink, closed sinks removed afterwards.
    pub fn emit(&self, kind: EventKind, agent: &str, data: Value) {
        let event = WireEvent::now(kind, agent, data);
        let line = match event.to_json() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, kind = kind.as_str(), "failed to serialize event");
                return;
            }
        };
        self.emitted.fetch_add(1, Ordering::Relaxed);

        // Copy out under the lock so slow sinks never hold it.
        let targets: Vec<(SubscriberId, mpsc::Sender<String>)> = {
            let subs = self.subscribers.lock().expect("subscriber lock");
            subs.iter().map(|s| (s.id, s.tx.clone())).collect()
        };

        let mut closed: Vec<SubscriberId> = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(line.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Transient backpressure: the sink misses this event only.
                    debug!(?id, kind = kind.as_str(), "subscriber full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.lock().expect("subscriber lock");
            subs.retain(|s| !closed.contains(&s.id));
            warn!(removed = closed.len(), "dropped dead event subscribers");
        }
    }

    // Convenience emitters matching the dashboard contract.

    pub fn emit_agent_start(&self, agent: &str, task: &str) {
        self.emit(EventKind::AgentStart, agent, json!({ "task": task }));
    }

    pub fn emit_agent_end(&self, agent: &str, success: bool, duration_secs: f64, tokens_used: u64) {
        self.emit(
            EventKind::AgentEnd,
            agent,
            json!({ "success": success, "duration": duration_secs, "tokens_used": tokens_used }),
        );
    }

    pub fn emit_code_written(&self, agent: &str, file_path: &str, code_length: usize) {
        self.emit(
            EventKind::CodeWritten,
            agent,
            json!({ "file_path": file_path, "code_length": code_length }),
        );
    }

    pub fn emit_file_created(&self, agent: &str, path: &str, content_length: usize) {
        self.emit(
            EventKind::FileCreated,
            agent,
            json!({ "path": path, "content_length": content_length }),
        );
    }

    pub fn emit_execution(&self, agent: &str, success: bool, output: &str, exit_code: i32) {
        self.emit(
            EventKind::Execution,
            agent,
            json!({ "success": success, "output": truncate(output, 500), "exit_code": exit_code }),
        );
    }

    pub fn emit_error(&self, agent: &str, error: &str) {
        self.emit(EventKind::Error, agent, json!({ "error": error }));
    }
}

/// Truncates to at most `max` bytes on a char boundary.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
