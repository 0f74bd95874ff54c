use atelier_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `owner_scopes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OwnerScope {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}
