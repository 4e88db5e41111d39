//! Orchestration event wire protocol: kind + agent + data + timestamp.
//!
//! This crate defines the wire shape of a single orchestration event and the
//! per-run envelope (run_id, sequence number). It does not depend on crucible;
//! crucible serializes its events through [`WireEvent::to_json`] and the serve
//! layer injects the run envelope before forwarding to subscribers.

pub mod envelope;
pub mod event;

pub use envelope::{RunEnvelope, RunSequencer};
pub use event::{EventKind, WireEvent};
