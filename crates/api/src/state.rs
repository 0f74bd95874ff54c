use std::sync::Arc;

use atelier_pipeline::Pipeline;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Submission, dispatch, cancellation, and query services.
    pub pipeline: Pipeline,
    /// WebSocket connections subscribed to job events.
    pub ws_manager: Arc<WsManager>,
    /// Database pool, when running against Postgres. Only used by `/health`.
    pub pool: Option<atelier_db::DbPool>,
}
