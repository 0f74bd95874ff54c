//! Row model for the `assets` table.

use atelier_core::asset::Asset;
use atelier_core::error::CoreError;
use atelier_core::job::MediaKind;
use atelier_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `assets` table.
#[derive(Debug, Clone, FromRow)]
pub struct AssetRow {
    pub id: DbId,
    pub job_id: Option<DbId>,
    pub owner_scope: DbId,
    pub kind: String,
    pub storage_ref: String,
    pub provider: String,
    pub provider_model: String,
    pub variation_index: Option<i32>,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at: Timestamp,
}

impl TryFrom<AssetRow> for Asset {
    type Error = CoreError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(Asset {
            id: row.id,
            job_id: row.job_id,
            owner_scope: row.owner_scope,
            kind: MediaKind::from_name(&row.kind)?,
            storage_ref: row.storage_ref,
            provider: row.provider,
            provider_model: row.provider_model,
            variation_index: row.variation_index,
            content_type: row.content_type,
            byte_size: row.byte_size,
            created_at: row.created_at,
            location: None,
        })
    }
}
