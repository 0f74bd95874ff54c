use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a task that pings every live-feed connection periodically so
/// idle proxies keep the sockets open. Abort the handle on shutdown.
pub fn start_heartbeat(ws_manager: Arc<WsManager>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            interval.tick().await;
            let count = ws_manager.connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
