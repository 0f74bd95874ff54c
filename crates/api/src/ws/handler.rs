use std::sync::Arc;

use atelier_core::types::DbId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::middleware::scope::OwnerScope;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /ws/jobs
///
/// Upgrade to a WebSocket that streams the caller's job events.
pub async fn ws_handler(
    OwnerScope(owner_scope): OwnerScope,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, owner_scope))
}

/// Register the connection, forward queued messages to the sink on a
/// spawned task, and drain inbound frames until the client goes away.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, owner_scope: DbId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, owner_scope, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone(), owner_scope).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Inbound frames carry nothing for us; read only to notice the close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
