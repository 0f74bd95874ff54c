//! Client-side status polling.
//!
//! [`StatusPoller`] is a pure observer: it only issues status and asset
//! queries, so polling a job any number of times never changes it, and
//! giving up (budget spent, user cancellation) leaves the job running on
//! the server.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::asset::Asset;
use atelier_core::job::{Job, JobErrorInfo, JobState, JobStatus};
use atelier_core::retry::{self, Backoff, RetryPolicy};
use atelier_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::api::AtelierApi;
use crate::error::ClientError;

const DEFAULT_INTERVAL_SECS: u64 = 3;
const DEFAULT_MAX_ATTEMPTS: u32 = 120;
const DEFAULT_ASSET_LOOKUPS: u32 = 5;
const DEFAULT_FOLLOWUP_SECS: u64 = 30;

/// The two queries the poller needs.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn job(&self, job_id: DbId) -> Result<Job, ClientError>;

    /// Assets among `ids` that are visible to the caller.
    async fn assets(&self, ids: &[DbId]) -> Result<Vec<Asset>, ClientError>;
}

#[async_trait]
impl JobStatusSource for AtelierApi {
    async fn job(&self, job_id: DbId) -> Result<Job, ClientError> {
        self.get_job(job_id).await
    }

    async fn assets(&self, ids: &[DbId]) -> Result<Vec<Asset>, ClientError> {
        self.get_assets(ids).await
    }
}

/// Something that can wait, without polling, until a job has probably
/// reached a terminal state. Implemented by [`crate::LiveMonitor`].
#[async_trait]
pub trait TerminalWatch: Send + Sync {
    async fn wait_terminal(&self, job_id: DbId, cancel: &CancellationToken) -> Result<(), ClientError>;
}

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Pause between status queries.
    pub interval: Duration,
    /// Status queries before giving up with [`PollOutcome::StillProcessing`].
    pub max_attempts: u32,
    /// Retry policy for resolving result assets once the job is `done`.
    pub asset_lookup: RetryPolicy,
    /// Re-check period while following a slow job after a hand-off.
    pub followup_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            asset_lookup: RetryPolicy::new(
                DEFAULT_ASSET_LOOKUPS,
                Backoff::Linear(Duration::from_secs(1)),
            ),
            followup_interval: Duration::from_secs(DEFAULT_FOLLOWUP_SECS),
        }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// `done`, with the result assets in variation order.
    Completed(Vec<Asset>),
    /// `failed`, with the job's error exactly as recorded.
    Failed(JobErrorInfo),
    Canceled,
    /// `done`, but the result assets did not all become visible within the
    /// lookup budget. They exist; ask again later.
    AssetsPendingVisibility { asset_ids: Vec<DbId> },
    /// Attempt budget spent while the job was still running. Not a failure.
    StillProcessing { last_status: Option<JobStatus> },
    /// The caller's cancellation token fired.
    Stopped,
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::StillProcessing { .. } | Self::Stopped)
    }
}

enum LookupError {
    Pending { visible: usize },
    Client(ClientError),
}

/// Follows one job at a time; holds no per-job state between calls.
pub struct StatusPoller<S> {
    source: S,
    config: PollConfig,
}

impl<S: JobStatusSource> StatusPoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Poll `job_id` until it is terminal, the budget is spent, or `cancel`
    /// fires.
    ///
    /// Transient errors count against the budget and are otherwise
    /// ignored. Non-transient errors (unknown job, bad credentials) are
    /// returned.
    pub async fn poll(&self, job_id: DbId, cancel: &CancellationToken) -> Result<PollOutcome, ClientError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_status = None;

        for attempt in 1..=max_attempts {
            let observed = tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Stopped),
                result = self.source.job(job_id) => result,
            };

            match observed {
                Ok(job) => {
                    if let Some(outcome) = self.classify(job, &mut last_status, cancel).await? {
                        return Ok(outcome);
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(job_id, attempt, error = %e, "Transient poll error");
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(PollOutcome::Stopped),
                    _ = tokio::time::sleep(self.config.interval) => {}
                }
            }
        }

        tracing::info!(job_id, max_attempts, "Poll budget spent, job still running");
        Ok(PollOutcome::StillProcessing { last_status })
    }

    /// [`poll`](Self::poll), then, if the budget runs out, keep following
    /// the job through `watch` with a slow periodic re-check as backstop.
    pub async fn poll_then_follow<W>(
        &self,
        job_id: DbId,
        watch: &W,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, ClientError>
    where
        W: TerminalWatch + ?Sized,
    {
        let outcome = self.poll(job_id, cancel).await?;
        if !matches!(outcome, PollOutcome::StillProcessing { .. }) {
            return Ok(outcome);
        }

        tracing::info!(job_id, "Handing off to live feed");
        let watch_fut = watch.wait_terminal(job_id, cancel);
        tokio::pin!(watch_fut);
        let mut watching = true;
        let mut recheck = tokio::time::interval(self.config.followup_interval);
        recheck.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(PollOutcome::Stopped),
                result = &mut watch_fut, if watching => {
                    watching = false;
                    if let Err(e) = result {
                        tracing::warn!(job_id, error = %e, "Live feed gave up, falling back to re-checks");
                    }
                }
                _ = recheck.tick() => {}
            }

            let mut last_status = None;
            match self.source.job(job_id).await {
                Ok(job) => {
                    if let Some(outcome) = self.classify(job, &mut last_status, cancel).await? {
                        return Ok(outcome);
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(job_id, error = %e, "Transient error while following job");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Terminal states become an outcome; anything else records the status
    /// and returns `None`.
    async fn classify(
        &self,
        job: Job,
        last_status: &mut Option<JobStatus>,
        cancel: &CancellationToken,
    ) -> Result<Option<PollOutcome>, ClientError> {
        let status = job.status();
        let progress = job.state.progress();
        let outcome = match job.state {
            JobState::Done { result } => self.resolve_assets(job.id, result, cancel).await?,
            JobState::Failed { error } => PollOutcome::Failed(error),
            JobState::Canceled => PollOutcome::Canceled,
            JobState::Queued | JobState::Processing { .. } => {
                tracing::trace!(job_id = job.id, %status, ?progress, "Job not finished");
                *last_status = Some(status);
                return Ok(None);
            }
        };
        Ok(Some(outcome))
    }

    /// Fetch the result assets, retrying while some are not yet visible.
    async fn resolve_assets(
        &self,
        job_id: DbId,
        asset_ids: Vec<DbId>,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, ClientError> {
        let lookup = retry::retry(
            &self.config.asset_lookup,
            |err: &LookupError| match err {
                LookupError::Pending { .. } => true,
                LookupError::Client(e) => e.is_transient(),
            },
            |attempt| {
                let ids = &asset_ids;
                async move {
                    let assets = self.source.assets(ids).await.map_err(LookupError::Client)?;
                    if assets.len() < ids.len() {
                        tracing::debug!(
                            job_id,
                            attempt,
                            visible = assets.len(),
                            expected = ids.len(),
                            "Result assets not visible yet"
                        );
                        return Err(LookupError::Pending {
                            visible: assets.len(),
                        });
                    }
                    Ok(assets)
                }
            },
        );

        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Ok(PollOutcome::Stopped),
            resolved = lookup => resolved,
        };

        match resolved {
            Ok(mut assets) => {
                assets.sort_by_key(|a| asset_ids.iter().position(|id| *id == a.id));
                Ok(PollOutcome::Completed(assets))
            }
            Err(LookupError::Client(e)) if !e.is_transient() => Err(e),
            Err(err) => {
                let visible = match err {
                    LookupError::Pending { visible } => visible,
                    LookupError::Client(_) => 0,
                };
                tracing::warn!(job_id, visible, expected = asset_ids.len(), "Result assets still not visible");
                Ok(PollOutcome::AssetsPendingVisibility { asset_ids })
            }
        }
    }
}
