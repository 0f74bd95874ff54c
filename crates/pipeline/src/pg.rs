//! Postgres-backed [`Store`](crate::store::Store) over the `atelier-db`
//! repositories.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::{Asset, NewAsset};
use atelier_core::job::{Job, JobErrorInfo, MediaKind};
use atelier_core::request::{JobListQuery, NewJob};
use atelier_core::types::DbId;
use atelier_db::models::asset::AssetRow;
use atelier_db::models::job::JobRow;
use atelier_db::repositories::{AssetRepo, JobRepo, OwnerScopeRepo};
use atelier_db::DbPool;

use crate::store::{AssetStore, JobStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, StoreError> {
    Ok(rows
        .into_iter()
        .map(Job::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}

fn into_assets(rows: Vec<AssetRow>) -> Result<Vec<Asset>, StoreError> {
    Ok(rows
        .into_iter()
        .map(Asset::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}

#[async_trait]
impl JobStore for PgStore {
    async fn scope_exists(&self, owner_scope: DbId) -> Result<bool, StoreError> {
        Ok(OwnerScopeRepo::exists(&self.pool, owner_scope).await?)
    }

    async fn insert_job(&self, job: &NewJob) -> Result<Job, StoreError> {
        let row = JobRepo::insert(&self.pool, job).await?;
        Ok(Job::try_from(row)?)
    }

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        match JobRepo::find_by_id(&self.pool, id).await? {
            Some(row) => Ok(Some(Job::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(
        &self,
        owner_scope: DbId,
        query: &JobListQuery,
    ) -> Result<Vec<Job>, StoreError> {
        into_jobs(JobRepo::list_by_scope(&self.pool, owner_scope, query).await?)
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        into_jobs(JobRepo::claim_batch(&self.pool, limit).await?)
    }

    async fn update_progress(&self, id: DbId, percent: i16) -> Result<bool, StoreError> {
        Ok(JobRepo::update_progress(&self.pool, id, percent).await?)
    }

    async fn complete(&self, id: DbId, asset_ids: &[DbId]) -> Result<bool, StoreError> {
        Ok(JobRepo::complete(&self.pool, id, asset_ids).await?)
    }

    async fn fail(&self, id: DbId, error: &JobErrorInfo) -> Result<bool, StoreError> {
        Ok(JobRepo::fail(&self.pool, id, &error.code, &error.message).await?)
    }

    async fn fail_stale(
        &self,
        older_than: Duration,
        error: &JobErrorInfo,
    ) -> Result<Vec<Job>, StoreError> {
        into_jobs(
            JobRepo::fail_stale(
                &self.pool,
                older_than.as_secs_f64(),
                &error.code,
                &error.message,
            )
            .await?,
        )
    }

    async fn cancel(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        match JobRepo::cancel(&self.pool, id).await? {
            Some(row) => Ok(Some(Job::try_from(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AssetStore for PgStore {
    async fn create_asset(&self, asset: &NewAsset) -> Result<Asset, StoreError> {
        let row = AssetRepo::create(&self.pool, asset).await?;
        Ok(Asset::try_from(row)?)
    }

    async fn find_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError> {
        match AssetRepo::find_by_id(&self.pool, id).await? {
            Some(row) => Ok(Some(Asset::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn find_assets(&self, owner_scope: DbId, ids: &[DbId]) -> Result<Vec<Asset>, StoreError> {
        into_assets(AssetRepo::find_by_ids(&self.pool, owner_scope, ids).await?)
    }

    async fn list_assets(
        &self,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Asset>, StoreError> {
        into_assets(AssetRepo::list_by_scope(&self.pool, owner_scope, kind, limit, offset).await?)
    }

    async fn list_job_assets(&self, job_id: DbId) -> Result<Vec<Asset>, StoreError> {
        into_assets(AssetRepo::list_by_job(&self.pool, job_id).await?)
    }
}
