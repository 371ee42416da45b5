use agent_hub_common::{TaskEvent, TaskId};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::middleware::auth::key_matches;
use crate::server::AppState;
use crate::types::{ClientMessage, ErrorResponse, SocketAck, SocketAuth};

const OUTBOUND_BUFFER: usize = 64;

/// Upgrade to a socket that can join task rooms
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(auth): Query<SocketAuth>,
    State(state): State<AppState>,
) -> Response {
    if let Some(expected) = &state.config.server.api_key {
        if !key_matches(expected, auth.api_key.as_deref()) {
            warn!("Rejected WebSocket upgrade with missing or invalid API key");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing or invalid API key", "UNAUTHORIZED")),
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();

    // Room forwarders and acks share one outbound queue
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(frame)).await {
                debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let mut rooms: HashMap<TaskId, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                match msg {
                    Message::Text(text) => {
                        let ack = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Join { task_id }) => {
                                if !rooms.contains_key(&task_id) {
                                    let events = state.events.subscribe(&task_id);
                                    let forwarder =
                                        tokio::spawn(forward_room(events, outbound_tx.clone()));
                                    rooms.insert(task_id.clone(), forwarder);
                                }
                                debug!(task_id = %task_id, "Client joined room");
                                SocketAck::Joined { task_id }
                            }
                            Ok(ClientMessage::Leave { task_id }) => {
                                if let Some(forwarder) = rooms.remove(&task_id) {
                                    forwarder.abort();
                                    let _ = forwarder.await;
                                    state.events.prune_room(task_id.as_str());
                                }
                                debug!(task_id = %task_id, "Client left room");
                                SocketAck::Left { task_id }
                            }
                            Err(e) => {
                                warn!(error = %e, "Invalid WebSocket message");
                                SocketAck::Error {
                                    message: format!("invalid message: {}", e),
                                }
                            }
                        };
                        if !send_json(&outbound_tx, &ack).await {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        info!("Client closed WebSocket connection");
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => break,
        }
    }

    for (task_id, forwarder) in rooms.drain() {
        forwarder.abort();
        let _ = forwarder.await;
        state.events.prune_room(task_id.as_str());
    }
    send_task.abort();
    info!("WebSocket connection closed");
}

/// Copy one room's events into the connection's outbound queue
async fn forward_room(mut events: broadcast::Receiver<TaskEvent>, outbound: mpsc::Sender<String>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if !send_json(&outbound, &event).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "WebSocket client lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_json<T: serde::Serialize>(outbound: &mpsc::Sender<String>, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => outbound.send(json).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket frame");
            true
        }
    }
}
