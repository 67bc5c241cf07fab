//! Websocket broadcaster: a thin `EventBus` subscriber rebroadcasting
//! `scam.detected`, `engagement.turn` and `engagement.completed` to anyone
//! connected, per spec.md §1's "websocket broadcaster (treated as a bus
//! subscriber)".

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use cipher_events::{ENGAGEMENT_COMPLETED, ENGAGEMENT_TURN, SCAM_DETECTED};
use tracing::{debug, warn};

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| broadcast_loop(socket, state))
}

async fn broadcast_loop(mut socket: WebSocket, state: AppState) {
    let mut scam_detected = match state.event_bus.subscribe(SCAM_DETECTED).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "ws subscriber failed to attach to scam.detected");
            return;
        }
    };
    let mut engagement_turn = match state.event_bus.subscribe(ENGAGEMENT_TURN).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "ws subscriber failed to attach to engagement.turn");
            return;
        }
    };
    let mut engagement_completed = match state.event_bus.subscribe(ENGAGEMENT_COMPLETED).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "ws subscriber failed to attach to engagement.completed");
            return;
        }
    };

    loop {
        let event = tokio::select! {
            Some(event) = scam_detected.recv() => event,
            Some(event) = engagement_turn.recv() => event,
            Some(event) = engagement_completed.recv() => event,
            else => break,
        };

        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to serialize event for ws broadcast");
                continue;
            }
        };

        if socket.send(Message::Text(payload)).await.is_err() {
            debug!("ws client disconnected");
            break;
        }
    }
}
