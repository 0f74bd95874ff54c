//! Repository for the `assets` table.

use atelier_core::asset::NewAsset;
use atelier_core::job::MediaKind;
use atelier_core::request::{DEFAULT_LIMIT, MAX_LIMIT};
use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::asset::AssetRow;

/// Column list for `assets` queries.
const COLUMNS: &str = "\
    id, job_id, owner_scope, kind, storage_ref, provider, provider_model, \
    variation_index, content_type, byte_size, created_at";

/// Provides insert and lookup operations for stored artifacts.
pub struct AssetRepo;

impl AssetRepo {
    /// Insert a new asset. Only called once the artifact is durably stored.
    pub async fn create(pool: &PgPool, input: &NewAsset) -> Result<AssetRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO assets \
                 (job_id, owner_scope, kind, storage_ref, provider, provider_model, \
                  variation_index, content_type, byte_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AssetRow>(&query)
            .bind(input.job_id)
            .bind(input.owner_scope)
            .bind(input.kind.as_str())
            .bind(&input.storage_ref)
            .bind(&input.provider)
            .bind(&input.provider_model)
            .bind(input.variation_index)
            .bind(&input.content_type)
            .bind(input.byte_size)
            .fetch_one(pool)
            .await
    }

    /// Find an asset by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AssetRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        sqlx::query_as::<_, AssetRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch the scope's assets among `ids`, ordered by variation then id.
    ///
    /// Missing ids are simply absent from the result; callers compare
    /// lengths to detect not-yet-visible rows.
    pub async fn find_by_ids(
        pool: &PgPool,
        owner_scope: DbId,
        ids: &[DbId],
    ) -> Result<Vec<AssetRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assets \
             WHERE owner_scope = $1 AND id = ANY($2) \
             ORDER BY variation_index ASC NULLS LAST, id ASC"
        );
        sqlx::query_as::<_, AssetRow>(&query)
            .bind(owner_scope)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// All assets created for a job, including orphans of a failed job.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<AssetRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assets WHERE job_id = $1 \
             ORDER BY variation_index ASC NULLS LAST, id ASC"
        );
        sqlx::query_as::<_, AssetRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// List a scope's assets, newest first, optionally filtered by kind.
    pub async fn list_by_scope(
        pool: &PgPool,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<AssetRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assets \
             WHERE owner_scope = $1 AND ($2::TEXT IS NULL OR kind = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, AssetRow>(&query)
            .bind(owner_scope)
            .bind(kind.map(|k| k.as_str()))
            .bind(limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
            .bind(offset.unwrap_or(0).max(0))
            .fetch_all(pool)
            .await
    }
}
