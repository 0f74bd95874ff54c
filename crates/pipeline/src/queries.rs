//! Read-only views over jobs and assets, scoped to an owner.
//!
//! Status queries never change state, so polling them any number of
//! times is harmless.

use std::sync::Arc;

use atelier_core::asset::Asset;
use atelier_core::job::{Job, MediaKind};
use atelier_core::request::JobListQuery;
use atelier_core::types::DbId;
use atelier_storage::ArtifactStore;

use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

pub struct JobQueries {
    store: Arc<dyn Store>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl JobQueries {
    pub fn new(store: Arc<dyn Store>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    /// A job owned by `owner_scope`. Jobs of other scopes are reported as
    /// not found.
    pub async fn job(&self, owner_scope: DbId, job_id: DbId) -> PipelineResult<Job> {
        self.store
            .find_job(job_id)
            .await?
            .filter(|j| j.owner_scope == owner_scope)
            .ok_or_else(|| PipelineError::job_not_found(job_id))
    }

    pub async fn jobs(&self, owner_scope: DbId, query: &JobListQuery) -> PipelineResult<Vec<Job>> {
        Ok(self.store.list_jobs(owner_scope, query).await?)
    }

    /// Assets among `ids` that are visible to `owner_scope`, with their
    /// retrieval locations filled in.
    pub async fn assets(&self, owner_scope: DbId, ids: &[DbId]) -> PipelineResult<Vec<Asset>> {
        let found = self.store.find_assets(owner_scope, ids).await?;
        Ok(self.with_locations(found))
    }

    pub async fn assets_by_kind(
        &self,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PipelineResult<Vec<Asset>> {
        let found = self
            .store
            .list_assets(owner_scope, kind, limit, offset)
            .await?;
        Ok(self.with_locations(found))
    }

    fn with_locations(&self, assets: Vec<Asset>) -> Vec<Asset> {
        assets
            .into_iter()
            .map(|mut a| {
                a.location = Some(self.artifacts.location(&a.storage_ref));
                a
            })
            .collect()
    }
}
