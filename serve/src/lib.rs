//! HTTP/WebSocket surface for the crucible engine.
//!
//! Routes: `POST /orchestrate` (run a task), `GET /health`, `GET /metrics`
//! (Prometheus text), `WS /ws/events` (live event stream). The engine itself
//! lives in the `crucible` crate; this layer only validates requests,
//! forwards events, and renders counters.

pub mod app;
mod events_ws;
mod metrics;
mod orchestrate;

pub use app::{router, AppState};
