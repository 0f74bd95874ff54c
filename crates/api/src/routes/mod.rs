pub mod assets;
pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                  list, submit
/// /jobs/dispatch         run one dispatch batch (POST)
/// /jobs/{id}             status
/// /jobs/{id}/cancel      cancel (POST)
/// /assets                lookup by ids, or list by kind
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/assets", assets::router())
}

/// Live-feed routes, mounted at the root next to `/health`.
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/jobs", get(ws::ws_handler))
}
