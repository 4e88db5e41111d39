//! WebSocket event stream: subscribe to the bus, forward every event line,
//! unsubscribe on disconnect. Client messages are ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};

use event_wire::RunSequencer;

use crate::app::AppState;

/// Per-subscriber channel capacity; a slower dashboard misses events past
/// this backlog rather than stalling the engine.
const SUBSCRIBER_CAPACITY: usize = 256;

pub(crate) async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let bus = state.engine.bus().clone();
    let (id, mut rx) = bus.subscribe(SUBSCRIBER_CAPACITY);
    let mut sequencer = RunSequencer::new(uuid::Uuid::new_v4().to_string());
    info!(stream = %sequencer.run_id, "event subscriber connected");

    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                let line = match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(mut value) => {
                        sequencer.inject_into(&mut value);
                        value.to_string()
                    }
                    Err(_) => line,
                };
                if sink.send(Message::Text(line)).await.is_err() {
                    break;
                }
            }
            incoming = source.next() => {
                match incoming {
                    // Inbound frames are ignored; close or error ends the stream.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => debug!("ignoring client message"),
                }
            }
        }
    }

    bus.unsubscribe(id);
    info!(stream = %sequencer.run_id, "event subscriber disconnected");
}
