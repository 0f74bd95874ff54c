//! Job intake: validate, resolve the scope, persist as `queued`.

use std::sync::Arc;

use atelier_core::error::CoreError;
use atelier_core::job::Job;
use atelier_core::request::SubmitJobRequest;
use atelier_core::types::DbId;
use atelier_events::{EventBus, JobEvent};
use atelier_provider::ProviderRegistry;

use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

pub struct SubmissionService {
    store: Arc<dyn Store>,
    providers: ProviderRegistry,
    events: Arc<EventBus>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn Store>, providers: ProviderRegistry, events: Arc<EventBus>) -> Self {
        Self {
            store,
            providers,
            events,
        }
    }

    /// Accept a generation request on behalf of `owner_scope`.
    ///
    /// Nothing is persisted when validation fails. The returned job is
    /// `queued`; execution happens later through the dispatcher.
    pub async fn submit(&self, owner_scope: DbId, request: SubmitJobRequest) -> PipelineResult<Job> {
        let new_job = request.into_new_job(owner_scope)?;

        if !self.providers.contains(&new_job.provider) {
            return Err(CoreError::Validation(format!(
                "Unknown provider '{}'. Registered: {}",
                new_job.provider,
                self.providers.names().join(", ")
            ))
            .into());
        }

        if !self.store.scope_exists(owner_scope).await? {
            return Err(PipelineError::UnresolvedScope(owner_scope));
        }

        let job = self.store.insert_job(&new_job).await?;
        self.events.publish(JobEvent::from_job(&job));

        tracing::info!(
            job_id = job.id,
            owner_scope,
            kind = %job.kind,
            provider = %job.provider,
            variations = job.variations,
            "Job submitted",
        );
        Ok(job)
    }
}
