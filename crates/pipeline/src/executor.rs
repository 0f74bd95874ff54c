//! Runs one claimed job to a terminal state.
//!
//! Steps:
//!
//! 1. Resolve input images and mask to bytes (URL fetch or stored asset).
//! 2. Call the provider, forwarding its progress to the job.
//! 3. For each artifact: check for cancellation, upload with bounded
//!    retry (provisioning a missing container once), create the asset.
//! 4. Check for cancellation, then write `done` with the asset ids.
//!
//! Any failure writes `failed` with a typed code. All terminal writes are
//! conditional on the job still being `processing`, so a cancellation
//! that lands mid-run always wins. Assets created before a failure or a
//! cancellation are left in place.
//!
//! The terminal write itself is retried on store errors. If it still
//! cannot be recorded the job stays `processing` until the dispatcher's
//! stale sweep fails it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::NewAsset;
use atelier_core::error_codes;
use atelier_core::job::{InputImage, Job, JobErrorInfo, JobStatus};
use atelier_core::retry::{retry, Backoff, RetryPolicy};
use atelier_core::types::DbId;
use atelier_events::{EventBus, JobEvent};
use atelier_provider::{Artifact, ProgressSink, ProviderRegistry, ProviderRequest, ResolvedImage};
use atelier_storage::keys::artifact_key;
use atelier_storage::{ArtifactStore, StorageError};

use crate::error::PipelineResult;
use crate::store::{Store, StoreError};

/// Content type assumed for fetched inputs that do not declare one.
const FALLBACK_INPUT_TYPE: &str = "application/octet-stream";

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Done { asset_ids: Vec<DbId> },
    Failed { error: JobErrorInfo },
    /// The job was canceled while running; nothing more was written.
    Canceled,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retry policy for each artifact upload.
    pub upload_retry: RetryPolicy,
    /// Retry policy for the final `done` / `failed` write.
    pub terminal_write_retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            upload_retry: RetryPolicy::new(
                3,
                Backoff::Exponential {
                    initial: Duration::from_millis(200),
                    multiplier: 2.0,
                    max: Duration::from_secs(5),
                },
            ),
            terminal_write_retry: RetryPolicy::new(
                5,
                Backoff::Exponential {
                    initial: Duration::from_millis(250),
                    multiplier: 2.0,
                    max: Duration::from_secs(4),
                },
            ),
        }
    }
}

/// Internal early-exit for the step pipeline.
enum Halt {
    Failed(JobErrorInfo),
    Canceled,
}

impl From<JobErrorInfo> for Halt {
    fn from(error: JobErrorInfo) -> Self {
        Self::Failed(error)
    }
}

pub struct GenerationExecutor {
    store: Arc<dyn Store>,
    providers: ProviderRegistry,
    artifacts: Arc<dyn ArtifactStore>,
    events: Arc<EventBus>,
    http: reqwest::Client,
    config: ExecutorConfig,
}

impl GenerationExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        providers: ProviderRegistry,
        artifacts: Arc<dyn ArtifactStore>,
        events: Arc<EventBus>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            providers,
            artifacts,
            events,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Announce the current state of `job` on the event bus.
    pub fn publish(&self, job: &Job) {
        self.events.publish(JobEvent::from_job(job));
    }

    /// Execute a job that this worker has already claimed.
    ///
    /// Returns `Err` only when the store keeps failing while recording the
    /// outcome, which leaves the job `processing`; every other failure is
    /// recorded on the job.
    pub async fn execute(&self, job: &Job) -> PipelineResult<ExecutionOutcome> {
        tracing::info!(
            job_id = job.id,
            provider = %job.provider,
            model = %job.model,
            variations = job.variations,
            "Executing job",
        );

        match self.run_steps(job).await {
            Ok(asset_ids) => self.finish_done(job, asset_ids).await,
            Err(Halt::Failed(error)) => self.finish_failed(job, error).await,
            Err(Halt::Canceled) => {
                tracing::info!(job_id = job.id, "Job canceled during execution");
                Ok(ExecutionOutcome::Canceled)
            }
        }
    }

    async fn run_steps(&self, job: &Job) -> Result<Vec<DbId>, Halt> {
        let provider = self.providers.get(&job.provider).ok_or_else(|| {
            JobErrorInfo::new(
                error_codes::PROVIDER_NOT_CONFIGURED,
                format!("Provider '{}' is not configured", job.provider),
            )
        })?;

        let request = self.build_request(job).await?;

        let progress = JobProgress {
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
            job_id: job.id,
            owner_scope: job.owner_scope,
        };
        let mut artifacts = provider
            .generate(&request, &progress)
            .await
            .map_err(|e| JobErrorInfo::new(e.code(), e.to_string()))?;

        if artifacts.is_empty() {
            return Err(JobErrorInfo::new(
                error_codes::PROVIDER_UNAVAILABLE,
                "Provider returned no artifacts",
            )
            .into());
        }
        let requested = job.variations.max(1) as usize;
        if artifacts.len() > requested {
            tracing::warn!(
                job_id = job.id,
                returned = artifacts.len(),
                requested,
                "Provider returned extra artifacts, keeping the first ones",
            );
            artifacts.truncate(requested);
        }

        let mut asset_ids = Vec::with_capacity(artifacts.len());
        for (index, artifact) in artifacts.iter().enumerate() {
            self.ensure_not_canceled(job.id).await?;

            let key = artifact_key(job.kind, &artifact.bytes, &artifact.content_type);
            self.upload(&key, artifact).await.map_err(upload_error)?;

            let asset = self
                .store
                .create_asset(&NewAsset {
                    job_id: Some(job.id),
                    owner_scope: job.owner_scope,
                    kind: job.kind,
                    storage_ref: key,
                    provider: job.provider.clone(),
                    provider_model: job.model.clone(),
                    variation_index: Some(index as i32),
                    content_type: artifact.content_type.clone(),
                    byte_size: artifact.bytes.len() as i64,
                })
                .await
                .map_err(|e| {
                    JobErrorInfo::new(error_codes::INTERNAL, format!("Asset record failed: {e}"))
                })?;

            tracing::debug!(
                job_id = job.id,
                asset_id = asset.id,
                variation_index = index,
                bytes = asset.byte_size,
                "Asset stored",
            );
            asset_ids.push(asset.id);
        }

        self.ensure_not_canceled(job.id).await?;
        Ok(asset_ids)
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    async fn build_request(&self, job: &Job) -> Result<ProviderRequest, JobErrorInfo> {
        let mut input_images = Vec::with_capacity(job.input_images.len());
        for image in &job.input_images {
            input_images.push(self.resolve_input(job, image).await?);
        }
        let mask = match &job.mask {
            Some(mask) => Some(self.resolve_input(job, mask).await?),
            None => None,
        };

        Ok(ProviderRequest {
            kind: job.kind,
            model: job.model.clone(),
            prompt: job.prompt_original.clone(),
            input_images,
            mask,
            output_spec: job.output_spec.clone(),
            variations: job.variations.max(1) as u32,
        })
    }

    async fn resolve_input(&self, job: &Job, image: &InputImage) -> Result<ResolvedImage, JobErrorInfo> {
        let unresolvable =
            |msg: String| JobErrorInfo::new(error_codes::INPUT_UNRESOLVABLE, msg);

        match image {
            InputImage::Url { url } => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| unresolvable(format!("Fetching {url} failed: {e}")))?;
                if !response.status().is_success() {
                    return Err(unresolvable(format!(
                        "Fetching {url} returned {}",
                        response.status()
                    )));
                }
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(FALLBACK_INPUT_TYPE)
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| unresolvable(format!("Reading {url} failed: {e}")))?;
                Ok(ResolvedImage {
                    bytes: bytes.to_vec(),
                    content_type,
                })
            }
            InputImage::Asset { asset_id } => {
                let asset = self
                    .store
                    .find_asset(*asset_id)
                    .await
                    .map_err(|e| unresolvable(format!("Asset {asset_id} lookup failed: {e}")))?
                    .filter(|a| a.owner_scope == job.owner_scope)
                    .ok_or_else(|| unresolvable(format!("Asset {asset_id} not found")))?;
                let bytes = self
                    .artifacts
                    .get(&asset.storage_ref)
                    .await
                    .map_err(|e| unresolvable(format!("Asset {asset_id} unreadable: {e}")))?;
                Ok(ResolvedImage {
                    bytes,
                    content_type: asset.content_type,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    /// Upload with bounded retry. A missing container is provisioned once,
    /// after which the upload gets a fresh retry budget.
    async fn upload(&self, key: &str, artifact: &Artifact) -> Result<(), StorageError> {
        let first = self.put_with_retry(key, artifact).await;
        match first {
            Err(e) if e.is_container_missing() => {
                tracing::warn!(
                    backend = self.artifacts.backend_name(),
                    "Storage container missing, provisioning",
                );
                self.artifacts.provision().await.map_err(|pe| {
                    StorageError::ContainerMissing(format!("provisioning failed: {pe}"))
                })?;
                self.put_with_retry(key, artifact).await
            }
            other => other,
        }
    }

    async fn put_with_retry(&self, key: &str, artifact: &Artifact) -> Result<(), StorageError> {
        retry(
            &self.config.upload_retry,
            |e: &StorageError| !e.is_container_missing(),
            |attempt| async move {
                let result = self
                    .artifacts
                    .put(key, &artifact.bytes, &artifact.content_type)
                    .await;
                if let Err(e) = &result {
                    tracing::debug!(key, attempt, error = %e, "Upload attempt failed");
                }
                result
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Terminal writes
    // -----------------------------------------------------------------------

    async fn ensure_not_canceled(&self, job_id: DbId) -> Result<(), Halt> {
        match self.store.find_job(job_id).await {
            Ok(Some(job)) if job.status() == JobStatus::Processing => Ok(()),
            Ok(_) => Err(Halt::Canceled),
            // Keep going; the terminal write is conditional on `processing`.
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Cancellation check failed");
                Ok(())
            }
        }
    }

    async fn finish_done(&self, job: &Job, asset_ids: Vec<DbId>) -> PipelineResult<ExecutionOutcome> {
        let ids = asset_ids.as_slice();
        let recorded = self
            .write_terminal(job.id, JobStatus::Done, || self.store.complete(job.id, ids))
            .await?;
        if !recorded {
            tracing::info!(job_id = job.id, "Job left processing before completion");
            return Ok(ExecutionOutcome::Canceled);
        }
        self.publish_current(job.id).await;
        tracing::info!(job_id = job.id, assets = asset_ids.len(), "Job done");
        Ok(ExecutionOutcome::Done { asset_ids })
    }

    async fn finish_failed(&self, job: &Job, error: JobErrorInfo) -> PipelineResult<ExecutionOutcome> {
        let recorded = self
            .write_terminal(job.id, JobStatus::Failed, || self.store.fail(job.id, &error))
            .await?;
        if !recorded {
            tracing::info!(job_id = job.id, "Job left processing before failure was recorded");
            return Ok(ExecutionOutcome::Canceled);
        }
        self.publish_current(job.id).await;
        tracing::warn!(
            job_id = job.id,
            code = %error.code,
            message = %error.message,
            "Job failed",
        );
        Ok(ExecutionOutcome::Failed { error })
    }

    /// Run one conditional terminal write under `terminal_write_retry`.
    async fn write_terminal<F, Fut>(&self, job_id: DbId, target: JobStatus, write: F) -> PipelineResult<bool>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let written = retry(
            &self.config.terminal_write_retry,
            StoreError::is_retryable,
            |attempt| {
                let pending = write();
                async move {
                    let result = pending.await;
                    if let Err(e) = &result {
                        tracing::warn!(job_id, %target, attempt, error = %e, "Terminal write failed");
                    }
                    result
                }
            },
        )
        .await;

        if let Err(e) = &written {
            tracing::error!(
                job_id,
                %target,
                error = %e,
                "Giving up on terminal write, job stays processing until the stale sweep",
            );
        }
        Ok(written?)
    }

    async fn publish_current(&self, job_id: DbId) {
        match self.store.find_job(job_id).await {
            Ok(Some(job)) => self.events.publish(JobEvent::from_job(&job)),
            Ok(None) => {}
            Err(e) => tracing::warn!(job_id, error = %e, "Could not load job for event"),
        }
    }
}

fn upload_error(err: StorageError) -> Halt {
    let code = if err.is_container_missing() {
        error_codes::STORAGE_CONTAINER_MISSING
    } else {
        error_codes::STORAGE_FAILED
    };
    Halt::Failed(JobErrorInfo::new(code, err.to_string()))
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Forwards provider progress to the job row and the event bus.
struct JobProgress {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    job_id: DbId,
    owner_scope: DbId,
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, percent: i16) {
        let percent = percent.clamp(0, 100);
        match self.store.update_progress(self.job_id, percent).await {
            Ok(true) => self
                .events
                .publish(JobEvent::progress(self.job_id, self.owner_scope, percent)),
            Ok(false) => {}
            Err(e) => tracing::warn!(job_id = self.job_id, error = %e, "Progress update failed"),
        }
    }
}
