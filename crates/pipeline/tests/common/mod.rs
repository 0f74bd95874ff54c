#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::{Asset, NewAsset};
use atelier_core::job::{InputImage, Job, JobErrorInfo, MediaKind, OutputSpec};
use atelier_core::request::{JobListQuery, NewJob, SubmitJobRequest};
use atelier_core::retry::{Backoff, RetryPolicy};
use atelier_core::types::DbId;
use atelier_events::EventBus;
use atelier_pipeline::{
    AssetStore, DispatchConfig, ExecutorConfig, JobStore, MemoryStore, Pipeline, Store, StoreError,
};
use atelier_provider::{
    Artifact, GenerationProvider, ProgressSink, ProviderError, ProviderRegistry, ProviderRequest,
};
use atelier_storage::MemoryArtifactStore;
use tokio::sync::Notify;

pub const SCOPE: i64 = 1;
pub const OTHER_SCOPE: i64 = 2;
pub const PROVIDER: &str = "stub";

/// Pauses a provider call until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

/// Provider double: returns one PNG per requested variation, or a fixed
/// error. Records every request it receives.
pub struct StubProvider {
    failure: Option<ProviderError>,
    gate: Option<Arc<Gate>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl StubProvider {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::succeeding()
        }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::succeeding()
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for StubProvider {
    async fn generate(
        &self,
        request: &ProviderRequest,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Artifact>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        progress.report(10).await;

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        progress.report(50).await;
        progress.report(30).await;
        progress.report(100).await;

        Ok((0..request.variations)
            .map(|i| Artifact {
                bytes: format!("{}#{i}", request.prompt).into_bytes(),
                content_type: "image/png".into(),
            })
            .collect())
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub provider: Arc<StubProvider>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new(provider: StubProvider) -> Self {
        Self::with_artifacts(provider, MemoryArtifactStore::new())
    }

    pub fn with_artifacts(provider: StubProvider, artifacts: MemoryArtifactStore) -> Self {
        Self::custom(provider, artifacts, Duration::from_secs(3600), |store| {
            store as Arc<dyn Store>
        })
    }

    /// Full control: `stale_after` for the dispatcher, and `wrap` to put a
    /// store double in front of the memory store the pipeline writes to.
    pub fn custom(
        provider: StubProvider,
        artifacts: MemoryArtifactStore,
        stale_after: Duration,
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>,
    ) -> Self {
        let store = Arc::new(MemoryStore::with_scopes([SCOPE, OTHER_SCOPE]));
        let artifacts = Arc::new(artifacts);
        let provider = Arc::new(provider);
        let events = Arc::new(EventBus::default());

        let providers = ProviderRegistry::new().with(PROVIDER, provider.clone());
        let pipeline = Pipeline::new(
            wrap(Arc::clone(&store)),
            providers,
            artifacts.clone(),
            Arc::clone(&events),
            DispatchConfig {
                batch_size: 4,
                interval: Duration::from_millis(20),
                stale_after,
            },
            ExecutorConfig {
                upload_retry: RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO)),
                terminal_write_retry: RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO)),
            },
        );

        Self {
            pipeline,
            store,
            artifacts,
            provider,
            events,
        }
    }

    pub async fn submit(&self, request: SubmitJobRequest) -> Job {
        self.pipeline
            .submission
            .submit(SCOPE, request)
            .await
            .expect("submission should succeed")
    }

    pub async fn job(&self, id: i64) -> Job {
        self.store
            .find_job(id)
            .await
            .unwrap()
            .expect("job should exist")
    }
}

pub fn image_request(variations: i32) -> SubmitJobRequest {
    SubmitJobRequest {
        kind: MediaKind::Image,
        provider: PROVIDER.into(),
        model: "stub-v1".into(),
        prompt: "a lighthouse at dusk".into(),
        prompt_alternatives: vec![],
        input_images: vec![],
        mask: None,
        output_spec: OutputSpec::default(),
        variations,
    }
}

pub fn with_input(mut request: SubmitJobRequest, image: InputImage) -> SubmitJobRequest {
    request.input_images.push(image);
    request
}

/// Store double over a [`MemoryStore`] whose first `complete_failures`
/// calls to `complete` fail with a pool timeout.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    complete_failures: AtomicU32,
    complete_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, complete_failures: u32) -> Self {
        Self {
            inner,
            complete_failures: AtomicU32::new(complete_failures),
            complete_calls: AtomicU32::new(0),
        }
    }

    pub fn complete_calls(&self) -> u32 {
        self.complete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn scope_exists(&self, owner_scope: DbId) -> Result<bool, StoreError> {
        self.inner.scope_exists(owner_scope).await
    }

    async fn insert_job(&self, job: &NewJob) -> Result<Job, StoreError> {
        self.inner.insert_job(job).await
    }

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        self.inner.find_job(id).await
    }

    async fn list_jobs(&self, owner_scope: DbId, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        self.inner.list_jobs(owner_scope, query).await
    }

    async fn claim_batch(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        self.inner.claim_batch(limit).await
    }

    async fn update_progress(&self, id: DbId, percent: i16) -> Result<bool, StoreError> {
        self.inner.update_progress(id, percent).await
    }

    async fn complete(&self, id: DbId, asset_ids: &[DbId]) -> Result<bool, StoreError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .complete_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.complete(id, asset_ids).await
    }

    async fn fail(&self, id: DbId, error: &JobErrorInfo) -> Result<bool, StoreError> {
        self.inner.fail(id, error).await
    }

    async fn fail_stale(&self, older_than: Duration, error: &JobErrorInfo) -> Result<Vec<Job>, StoreError> {
        self.inner.fail_stale(older_than, error).await
    }

    async fn cancel(&self, id: DbId) -> Result<Option<Job>, StoreError> {
        self.inner.cancel(id).await
    }
}

#[async_trait]
impl AssetStore for FlakyStore {
    async fn create_asset(&self, asset: &NewAsset) -> Result<Asset, StoreError> {
        self.inner.create_asset(asset).await
    }

    async fn find_asset(&self, id: DbId) -> Result<Option<Asset>, StoreError> {
        self.inner.find_asset(id).await
    }

    async fn find_assets(&self, owner_scope: DbId, ids: &[DbId]) -> Result<Vec<Asset>, StoreError> {
        self.inner.find_assets(owner_scope, ids).await
    }

    async fn list_assets(
        &self,
        owner_scope: DbId,
        kind: Option<MediaKind>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Asset>, StoreError> {
        self.inner.list_assets(owner_scope, kind, limit, offset).await
    }

    async fn list_job_assets(&self, job_id: DbId) -> Result<Vec<Asset>, StoreError> {
        self.inner.list_job_assets(job_id).await
    }
}
