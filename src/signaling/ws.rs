//! WebSocket transport for the signaling relay
//!
//! Endpoint: `GET /ws?sessionId=<id>` (upgrade). Each socket is bridged to
//! one relay [`Connection`]:
//! - text frames from the client are handed to the relay
//! - messages the relay addresses to this session are written back
//! - the server pings the client every heartbeat interval

use super::relay::Connection;
use crate::auth::Actor;
use crate::error::MonitorError;
use crate::http::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingQuery {
    pub session_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn signaling_handler(
    ws: WebSocketUpgrade,
    actor: Actor,
    Query(query): Query<SignalingQuery>,
    State(state): State<AppState>,
) -> Response {
    debug!("Signaling upgrade from {}", actor.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: Option<String>) {
    let connection = match state.relay.connect(session_id.as_deref()) {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Rejecting signaling channel: {}", e);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "No sessionId provided".into(),
                })))
                .await;
            return;
        }
    };

    let Connection {
        session_id,
        handle,
        mut outbound,
    } = connection;

    // Opaque keys need not name a registered session
    match state.registry.bind_peer(&session_id, handle) {
        Ok(()) => debug!("Bound channel {} to session {}", handle, session_id),
        Err(MonitorError::NotFound(_)) => {}
        Err(e) => debug!("Channel {} not bound: {}", handle, e),
    }

    let (mut sender, mut receiver) = socket.split();

    let period = state.config.signaling.heartbeat();
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        state.relay.handle_text(&session_id, handle, &text);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame from session {}", session_id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed channel {} ({})", handle, session_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error for session {}: {}", session_id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            message = outbound.recv() => {
                match message {
                    Some(message) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("Failed to encode {} message: {}", message.kind(), e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text)).await.is_err() {
                            warn!("Failed to send to session {}, disconnecting", session_id);
                            break;
                        }
                    }
                    None => {
                        info!("Channel {} for session {} released", handle, session_id);
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::NORMAL,
                                reason: "Session released".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!("Failed to ping session {}, disconnecting", session_id);
                    break;
                }
            }
        }
    }

    state.relay.disconnect(&session_id, handle);
    if let Ok(true) = state.registry.clear_peer(&session_id, handle) {
        debug!("Cleared peer handle {} from session {}", handle, session_id);
    }
}
