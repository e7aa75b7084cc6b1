//! Observer WebSocket
//!
//! `GET /api/v1/ws` upgrades to a WebSocket that receives every price
//! update payload verbatim as a text frame. Clients never need to send
//! anything; incoming frames are read only to notice a close.

use crate::broadcast::{ConnectionId, ConnectionRegistry};
use crate::telemetry::metrics;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// WebSocket upgrade handler.
///
/// ## Protocol
///
/// 1. Client connects with a standard WebSocket upgrade
/// 2. Server registers the connection with the broadcaster
/// 3. Server sends each price update as `{"auctionId":..,"newPrice":..}`
/// 4. On close or send failure the connection is unregistered
///
/// ```text
/// GET /api/v1/ws
/// Upgrade: websocket
/// ```
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<ConnectionRegistry>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

/// Runs for the lifetime of one observer connection.
async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>) {
    let (connection_id, mut updates) = registry.register();
    if let Some(m) = metrics() {
        m.ws_connected();
    }
    info!(connection_id, observers = registry.len(), "Observer connected");

    let (mut sender, mut receiver) = socket.split();

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(connection_id, "Client sent close frame");
                    break;
                }
                Ok(_) => {
                    // Pings are answered by axum; everything else is ignored.
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            next = updates.recv() => match next {
                Some(payload) => {
                    if let Err(e) = sender.send(Message::Text(payload.into())).await {
                        debug!(connection_id, error = %e, "Send failed, closing connection");
                        break;
                    }
                }
                // Unregistered by the broadcaster (queue full).
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = &mut recv_task => {
                debug!(connection_id, "Receiver task finished");
                break;
            }
        }
    }

    recv_task.abort();
    disconnect(&registry, connection_id);
}

fn disconnect(registry: &ConnectionRegistry, connection_id: ConnectionId) {
    registry.unregister(connection_id);
    if let Some(m) = metrics() {
        m.ws_disconnected();
    }
    info!(connection_id, observers = registry.len(), "Observer disconnected");
}
