//! WebSocket connection handlers.
//!
//! Per connection: verify the handshake credential before the upgrade, then
//! run one receive loop (inbound events, handled strictly in order) and one
//! pusher task (outbound frames from the connection's channel). Teardown
//! always funnels through [`Gateway::disconnect`].

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::domain::{AuthenticatedUser, ConnectionId};
use crate::gateway::{ClientEvent, ConnectionContext, ConnectionErrorKind, Gateway, ServerEvent};

use super::super::state::AppState;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Authentication failure closes the attempt before any state exists.
    let user = match state.gateway.authenticate(&query.token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Rejecting connection with invalid credential: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

/// Spawns a task that drains the connection's outbound channel into the
/// WebSocket sink.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, user: AuthenticatedUser) {
    let ctx = ConnectionContext {
        conn_id: ConnectionId::generate(),
        user,
    };
    let (tx, rx) = mpsc::unbounded_channel();

    let emits = match state.gateway.connect(&ctx, tx).await {
        Ok(emits) => emits,
        Err(rejection) => {
            // The one fatal rejection after the upgrade: tell the client why,
            // then close the transport.
            tracing::warn!(
                "Rejecting connection for user '{}': {}",
                ctx.user.user_id,
                rejection
            );
            let event = ServerEvent::ConnectionError {
                error: ConnectionErrorKind::ConnectionLimitExceeded,
                message: rejection.to_string(),
            };
            if let Ok(payload) = serde_json::to_string(&event) {
                let _ = socket.send(Message::Text(payload.into())).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    state.gateway.deliver(emits).await;

    let (sender, receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);
    let mut recv_task = receive_loop(receiver, state.gateway.clone(), ctx.clone());

    // If either direction ends, tear the other one down.
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    let emits = state.gateway.disconnect(ctx.conn_id).await;
    state.gateway.deliver(emits).await;
}

/// Spawns the inbound event loop for one connection.
///
/// Frames are handled one at a time, so events from a single connection are
/// never reordered or processed concurrently with each other.
fn receive_loop(
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    gateway: Arc<Gateway>,
    ctx: ConnectionContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("WebSocket error on '{}': {}", ctx.conn_id, e);
                    break;
                }
            };

            match frame {
                Message::Text(text) => {
                    // Malformed frames are logged and dropped, never answered.
                    let event = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(
                                "Dropping malformed frame from user '{}': {}",
                                ctx.user.user_id,
                                e
                            );
                            continue;
                        }
                    };
                    let emits = gateway.handle_event(&ctx, event).await;
                    gateway.deliver(emits).await;
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", ctx.conn_id);
                    break;
                }
                Message::Ping(_) => {
                    // Ping/pong is handled by the protocol layer.
                }
                _ => {}
            }
        }
    })
}
