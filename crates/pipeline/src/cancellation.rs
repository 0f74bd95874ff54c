//! Best-effort cancellation.
//!
//! Canceling moves a `queued` or `processing` job to `canceled`. An
//! executor already working on the job notices at its next checkpoint
//! (before each upload and before the terminal write); its later
//! conditional writes then fail and the cancellation stands. Work that
//! was already uploaded stays in storage as orphans.

use std::sync::Arc;

use atelier_core::job::Job;
use atelier_core::types::DbId;
use atelier_events::{EventBus, JobEvent};

use crate::error::{PipelineError, PipelineResult};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The job was queued or processing and is now canceled.
    Canceled(Job),
    /// The job had already finished; nothing changed.
    AlreadyTerminal(Job),
}

impl CancelOutcome {
    pub fn job(&self) -> &Job {
        match self {
            Self::Canceled(job) | Self::AlreadyTerminal(job) => job,
        }
    }

    pub fn was_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }
}

pub struct CancellationHandler {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
}

impl CancellationHandler {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    /// Cancel `job_id` if it belongs to `owner_scope`.
    ///
    /// Canceling a terminal job is a successful no-op.
    pub async fn cancel(&self, owner_scope: DbId, job_id: DbId) -> PipelineResult<CancelOutcome> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .filter(|j| j.owner_scope == owner_scope)
            .ok_or_else(|| PipelineError::job_not_found(job_id))?;

        if job.state.is_terminal() {
            tracing::debug!(job_id, status = %job.status(), "Cancel requested on finished job");
            return Ok(CancelOutcome::AlreadyTerminal(job));
        }

        match self.store.cancel(job_id).await? {
            Some(canceled) => {
                self.events.publish(JobEvent::from_job(&canceled));
                tracing::info!(job_id, owner_scope, from = %job.status(), "Job canceled");
                Ok(CancelOutcome::Canceled(canceled))
            }
            None => {
                // Finished between the read and the conditional write.
                let current = self
                    .store
                    .find_job(job_id)
                    .await?
                    .ok_or_else(|| PipelineError::job_not_found(job_id))?;
                Ok(CancelOutcome::AlreadyTerminal(current))
            }
        }
    }
}
