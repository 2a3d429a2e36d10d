pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::*;

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Authenticate right away instead of waiting for an `authenticate` message
    pub session_token: Option<String>,
}

/// Per-socket state
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub player_id: Option<PlayerId>,
    pub is_admin: bool,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            player_id: None,
            is_admin: false,
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!(
        "WebSocket connection request (auto-auth: {})",
        params.session_token.is_some()
    );
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Returns false once the socket can no longer be written to
async fn send_json(sender: &mut (impl Sink<Message> + Unpin), msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Receive from a broadcast channel, skipping over lag.
/// Returns None once the channel is closed.
async fn recv_next(rx: &mut broadcast::Receiver<ServerMessage>) -> Option<ServerMessage> {
    loop {
        match rx.recv().await {
            Ok(msg) => return Some(msg),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Socket lagged behind, skipped {} messages", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::new();

    tracing::info!("WebSocket connected: {}", conn.id);

    // Subscribe before anything is sent so no event is missed
    let mut broadcast_rx = state.broadcast.subscribe();
    let mut admin_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        connection_id: conn.id.clone(),
        server_now: now_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    if let Some(session_token) = params.session_token {
        let msg = ClientMessage::Authenticate { session_token };
        if let Some(reply) = handlers::handle_message(msg, &mut conn, &state).await {
            if !send_json(&mut sender, &reply).await {
                state.disconnect_connection(&conn.id).await;
                return;
            }
        }
    }

    loop {
        tokio::select! {
            // Events for every client
            msg = recv_next(&mut broadcast_rx) => {
                let Some(msg) = msg else { break };
                if matches!(msg, ServerMessage::GameReset) {
                    // The player behind this socket no longer exists
                    conn.player_id = None;
                }
                if !send_json(&mut sender, &msg).await {
                    break;
                }
            }

            // Admin-only events
            admin_msg = async {
                match &mut admin_rx {
                    Some(rx) => recv_next(rx).await,
                    None => std::future::pending::<Option<ServerMessage>>().await,
                }
            } => {
                if let Some(msg) = admin_msg {
                    if !send_json(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message on {}: {}", conn.id, text);

                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &mut conn, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };

                        if conn.is_admin && admin_rx.is_none() {
                            admin_rx = Some(state.admin_broadcast.subscribe());
                        }

                        if let Some(reply) = reply {
                            if !send_json(&mut sender, &reply).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("WebSocket {} closed by client", conn.id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error on {}: {}", conn.id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect_connection(&conn.id).await;
    tracing::info!("WebSocket connection closed: {}", conn.id);
}
