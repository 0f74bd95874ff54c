//! In-process [`Store`](crate::store::Store) for development and tests.
//!
//! All state sits behind a single `tokio::sync::Mutex`, so every
//! conditional transition is atomic exactly like its SQL counterpart.
//! Each status written to a job is also appended to a per-job history,
//! which lets tests assert the full path a job took.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::{Asset, NewAsset};
use atelier_core::job::{Job, JobErrorInfo, JobState, JobStatus, MediaKind};
use atelier_core::request::{JobListQuery, NewJob, DEFAULT_LIMIT, MAX_LIMIT};
use atelier_core::types::DbId;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::store::{AssetStore, JobStore, StoreError};

#[derive(Default)]
struct Inner {
    scopes: HashSet<DbId>,
    jobs: BTreeMap<DbId, Job>,
    assets: BTreeMap<DbId, Asset>,
    history: HashMap<DbId, Vec<JobStatus>>,
    /// Last claim or progress write per job, the `updated_at` analogue.
    touched: HashMap<DbId, DateTime<Utc>>,
    next_job_id: DbId,
    next_asset_id: DbId,
}

impl Inner {
    fn set_state(&mut self, id: DbId, state: JobState) -> Option<&Job> {
        let now = Utc::now();
        let job = self.jobs.get_mut(&id)?;
        let status = state.status();

        if status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        self.touched.insert(id, now);
        if status.is_terminal() {
            job.completed_at = Some(job.started_at.map_or(now, |s| s.max(now)));
        }
        job.state = state;
        self.history.entry(id).or_default().push(status);
        self.jobs.get(&id)
    }

    fn is_processing(&self, id: DbId) -> bool {
        self.jobs
            .get(&id)
            .is_some_and(|j| j.status() == JobStatus::Processing)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the given owner scopes already registered.
    pub fn with_scopes(scopes: impl IntoIterator<Item = DbId>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                scopes: scopes.into_iter().collect(),
                ..Inner::default()
            }),
        }
    }

    pub async fn add_scope(&self, owner_scope: DbId) {
        self.inner.lock().await.scopes.insert(owner_scope);
    }

    /// Every status written to `job_id`, in order, starting with `queued`.
    pub async fn history(&self, job_id: DbId) -> Vec<JobStatus> {
        self.inner
            .lock()
            .await
            .history
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn asset_count(&self) -> usize {
        self.inner.lock().await.assets.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn scope_exists(&self, owner_scope: DbId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.scopes.contains(&owner_scope))
    }

    async fn insert_job(&self, job: &NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_job_id += 1;
        let id = inner.next_job_id;

        let created = Job {
            id,
            owner_scope: job.owner_scope,
            kind: job.kind,
            provider: job.provider.clone(),
            model: job.model.clone(),
            prompt_original: job.prompt_original.clone(),
            prompt_alternatives: job.prompt_alternatives.clone(),
            input_images: job.input_images.clone(),
            mask: job.mask.clone(),
            output_spec: job.output_spec.clone(),
            variations: job.variations,
            state: JobState::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        inner.jobs.insert(id, created.clone());
        inner.history.insert(id, vec![JobStatus::Queued]);
        Ok(created)
    }

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(
        &self,
        owner_scope: DbId,
        query: &JobListQuery,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .values()
            .rev()
            .filter(|j| j.owner_scope == owner_scope)
            .filter(|j| query.status.map_or(true, |s| j.status() == s))
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .cloned()
            .collect())
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        let ids: Vec<DbId> = inner
            .jobs
            .values()
            .filter(|j| j.status() == JobStatus::Queued)
            .take(limit.max(0) as usize)
            .map(|j| j.id)
            .collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = inner.set_state(id, JobState::Processing { progress: None }) {
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn update_progress(&self, id: DbId, percent: i16) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;
        let percent = percent.clamp(0, 100);
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };
        match &mut job.state {
            JobState::Processing { progress } if progress.map_or(true, |p| p < percent) => {
                *progress = Some(percent);
                inner.touched.insert(id, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, id: DbId, asset_ids: &[DbId]) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.is_processing(id) {
            return Ok(false);
        }
        inner.set_state(
            id,
            JobState::Done {
                result: asset_ids.to_vec(),
            },
        );
        Ok(true)
    }

    async fn fail(&self, id: DbId, error: &JobErrorInfo) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.is_processing(id) {
            return Ok(false);
        }
        inner.set_state(
            id,
            JobState::Failed {
                error: error.clone(),
            },
        );
        Ok(true)
    }

    async fn fail_stale(
        &self,
        older_than: Duration,
        error: &JobErrorInfo,
    ) -> Result<Vec<Job>, StoreError> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(Vec::new());
        };

        let mut inner = self.inner.lock().await;
        let stale: Vec<DbId> = inner
            .jobs
            .values()
            .filter(|j| j.status() == JobStatus::Processing)
            .filter(|j| inner.touched.get(&j.id).is_some_and(|t| *t <= cutoff))
            .map(|j| j.id)
            .collect();

        let mut failed = Vec::with_capacity(stale.len());
        for id in stale {
            let state = JobState::Failed {
                error: error.clone(),
            };
            if let Some(job) = inner.set_state(id, state) {
                failed.push(job.clone());
            }
        }
        Ok(failed)
    }

    async fn cancel(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        let cancelable = inner.jobs.get(&id).is_some_and(|j| !j.state.is_terminal());
        if !cancelable {
            return Ok(None);
        }
        Ok(inner.set_state(id, JobState::Canceled).cloned())
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn create_asset(&self, asset: &NewAsset) -> Result<Asset, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_asset_id += 1;
        let id = inner.next_asset_id;

        let created = Asset {
            id,
            job_id: asset.job_id,
            owner_scope: asset.owner_scope,
            kind: asset.kind,
            storage_ref: asset.storage_ref.clone(),
            provider: asset.provider.clone(),
            provider_model: asset.provider_model.clone(),
            variation_index: asset.variation_index,
            content_type: asset.content_type.clone(),
            byte_size: asset.byte_size,
            created_at: Utc::now(),
            location: None,
        };
        inner.assets.insert(id, created.clone());
        Ok(created)
    }

    async fn find_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError> {
        Ok(self.inner.lock().await.assets.get(&id).cloned())
    }

    async fn find_assets(&self, owner_scope: DbId, ids: &[DbId]) -> Result<Vec<Asset>, StoreError> {
        let inner = self.inner.lock().await;
        let mut found: Vec<Asset> = ids
            .iter()
            .filter_map(|id| inner.assets.get(id))
            .filter(|a| a.owner_scope == owner_scope)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.variation_index.is_none(), a.variation_index, a.id));
        found.dedup_by_key(|a| a.id);
        Ok(found)
    }

    async fn list_assets(
        &self,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Asset>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .assets
            .values()
            .rev()
            .filter(|a| a.owner_scope == owner_scope)
            .filter(|a| kind.map_or(true, |k| a.kind == k))
            .skip(offset.unwrap_or(0).max(0) as usize)
            .take(limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize)
            .cloned()
            .collect())
    }

    async fn list_job_assets(&self, job_id: DbId) -> Result<Vec<Asset>, StoreError> {
        let inner = self.inner.lock().await;
        let mut found: Vec<Asset> = inner
            .assets
            .values()
            .filter(|a| a.job_id == Some(job_id))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.variation_index.is_none(), a.variation_index, a.id));
        Ok(found)
    }
}
