//! Forwards job events from the bus to live-feed WebSocket subscribers.

use std::sync::Arc;

use atelier_events::JobEvent;
use axum::extract::ws::Message;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::ws::WsManager;

/// Relay every event to the connections of its owner scope.
///
/// Returns when the bus is closed (all senders dropped).
pub async fn run(ws_manager: Arc<WsManager>, mut events: broadcast::Receiver<JobEvent>) {
    tracing::info!("Event forwarder started");

    loop {
        match events.recv().await {
            Ok(event) => forward(&ws_manager, &event).await,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event forwarder lagged, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::info!("Event forwarder stopped");
}

async fn forward(ws_manager: &WsManager, event: &JobEvent) {
    let payload = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(job_id = event.job_id, error = %e, "Failed to serialize job event");
            return;
        }
    };

    let delivered = ws_manager
        .send_to_scope(event.owner_scope, Message::Text(payload.into()))
        .await;
    tracing::trace!(job_id = event.job_id, status = %event.status, delivered, "Job event forwarded");
}
