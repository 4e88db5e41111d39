//! Minimal Prometheus text rendering of engine counters.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;

use crate::app::AppState;

pub(crate) async fn metrics(State(state): State<Arc<AppState>>) -> String {
    let stats = state.engine.stats();
    let bus = state.engine.bus();
    render(
        stats.runs_started.load(Ordering::Relaxed),
        stats.runs_succeeded.load(Ordering::Relaxed),
        stats.runs_failed.load(Ordering::Relaxed),
        bus.events_emitted(),
        bus.subscriber_count(),
    )
}

fn render(started: u64, succeeded: u64, failed: u64, events: u64, subscribers: usize) -> String {
    format!(
        "# HELP crucible_runs_started_total Orchestration runs started.\n\
         # TYPE crucible_runs_started_total counter\n\
         crucible_runs_started_total {started}\n\
         # HELP crucible_runs_succeeded_total Runs that finished with success=true.\n\
         # TYPE crucible_runs_succeeded_total counter\n\
         crucible_runs_succeeded_total {succeeded}\n\
         # HELP crucible_runs_failed_total Runs that finished with success=false.\n\
         # TYPE crucible_runs_failed_total counter\n\
         crucible_runs_failed_total {failed}\n\
         # HELP crucible_events_emitted_total Events emitted on the bus.\n\
         # TYPE crucible_events_emitted_total counter\n\
         crucible_events_emitted_total {events}\n\
         # HELP crucible_event_subscribers Current event subscribers.\n\
         # TYPE crucible_event_subscribers gauge\n\
         crucible_event_subscribers {subscribers}\n"
    )
}
