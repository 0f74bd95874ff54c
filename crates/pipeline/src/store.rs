//! Persistence seams used by the pipeline services.
//!
//! [`JobStore`] and [`AssetStore`] describe exactly the reads and
//! conditional writes the job lifecycle needs. Every write that moves a
//! job between states is conditional on the state it expects, so two
//! concurrent writers can never both succeed: the loser sees `false` or
//! `None` and must re-read.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::{Asset, NewAsset};
use atelier_core::error::CoreError;
use atelier_core::job::{Job, JobErrorInfo, MediaKind};
use atelier_core::request::{JobListQuery, NewJob};
use atelier_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row did not decode into a valid domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] CoreError),
}

impl StoreError {
    /// Worth another attempt: connection and pool trouble, not bad data.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => !matches!(
                e,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::Configuration(_)
            ),
            Self::Corrupt(_) => false,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn scope_exists(&self, owner_scope: DbId) -> Result<bool, StoreError>;

    /// Persist a new job in `queued`.
    async fn insert_job(&self, job: &NewJob) -> Result<Job, StoreError>;

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(&self, owner_scope: DbId, query: &JobListQuery)
        -> Result<Vec<Job>, StoreError>;

    /// Atomically move up to `limit` queued jobs to `processing`, oldest
    /// first. A job is returned by at most one caller.
    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Raise progress on a processing job. Never lowers it.
    async fn update_progress(&self, id: DbId, percent: i16) -> Result<bool, StoreError>;

    /// `processing -> done`. `false` if the job was no longer processing.
    async fn complete(&self, id: DbId, asset_ids: &[DbId]) -> Result<bool, StoreError>;

    /// `processing -> failed`. `false` if the job was no longer processing.
    async fn fail(&self, id: DbId, error: &JobErrorInfo) -> Result<bool, StoreError>;

    /// `processing -> failed` with `error` for every job whose last claim or
    /// progress write is at least `older_than` ago. Returns the failed jobs.
    async fn fail_stale(
        &self,
        older_than: Duration,
        error: &JobErrorInfo,
    ) -> Result<Vec<Job>, StoreError>;

    /// `queued | processing -> canceled`. `None` if missing or terminal.
    async fn cancel(&self, id: DbId) -> Result<Option<Job>, StoreError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create_asset(&self, asset: &NewAsset) -> Result<Asset, StoreError>;

    async fn find_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError>;

    /// The scope's assets among `ids`. Ids that are missing (or not yet
    /// visible) are left out rather than reported as errors.
    async fn find_assets(&self, owner_scope: DbId, ids: &[DbId]) -> Result<Vec<Asset>, StoreError>;

    async fn list_assets(
        &self,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Asset>, StoreError>;

    async fn list_job_assets(&self, job_id: DbId) -> Result<Vec<Asset>, StoreError>;
}

/// Both halves of the persistence layer behind one trait object.
pub trait Store: JobStore + AssetStore {}

impl<T: JobStore + AssetStore> Store for T {}
