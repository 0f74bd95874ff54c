//! Handlers for the `/assets` resource.

use atelier_core::job::MediaKind;
use atelier_core::request::MAX_LIMIT;
use atelier_core::types::DbId;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::scope::OwnerScope;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /api/v1/assets`.
#[derive(Debug, Default, Deserialize)]
pub struct AssetQuery {
    /// Comma-separated asset ids, e.g. `ids=4,5,6`.
    pub ids: Option<String>,
    pub kind: Option<MediaKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Parse a comma-separated id list. Blank entries are skipped.
fn parse_ids(raw: &str) -> AppResult<Vec<DbId>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<DbId>()
                .map_err(|_| AppError::BadRequest(format!("Invalid asset id '{s}'")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    if ids.len() as i64 > MAX_LIMIT {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_LIMIT} ids per request"
        )));
    }
    Ok(ids)
}

/// GET /api/v1/assets
///
/// With `ids`, returns the caller's assets among them (missing or not yet
/// visible ids are simply absent). Otherwise lists the caller's assets,
/// optionally filtered by `kind`. Every asset carries its `location`.
pub async fn list_assets(
    OwnerScope(owner_scope): OwnerScope,
    State(state): State<AppState>,
    Query(params): Query<AssetQuery>,
) -> AppResult<impl IntoResponse> {
    let assets = match params.ids.as_deref() {
        Some(raw) => {
            let ids = parse_ids(raw)?;
            state.pipeline.queries.assets(owner_scope, &ids).await?
        }
        None => {
            state
                .pipeline
                .queries
                .assets_by_kind(owner_scope, params.kind, params.limit, params.offset)
                .await?
        }
    };

    Ok(Json(DataResponse { data: assets }))
}
