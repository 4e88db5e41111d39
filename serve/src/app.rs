//! Axum app: shared state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crucible::Engine;

/// Shared server state: one engine serves every request.
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Builds the router over the given engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route("/orchestrate", post(crate::orchestrate::orchestrate))
        .route("/health", get(crate::orchestrate::health))
        .route("/metrics", get(crate::metrics::metrics))
        .route("/ws/events", get(crate::events_ws::ws_events))
        .with_state(state)
}
