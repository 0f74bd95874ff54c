//! Claims queued jobs and hands them to the executor.
//!
//! Triggered three ways: right after a submission, by the scheduled loop
//! in [`Dispatcher::run`], and by an explicit dispatch request. Any
//! number of dispatchers may run at once; the store's atomic claim makes
//! sure each job is executed by exactly one of them.
//!
//! The scheduled loop also sweeps for stale jobs: `processing` rows whose
//! executor went away (process exit, unrecordable terminal write) are
//! failed with code `internal` once they stop making progress.

use std::sync::Arc;
use std::time::Duration;

use atelier_core::error_codes;
use atelier_core::job::{Job, JobErrorInfo};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineResult;
use crate::executor::{ExecutionOutcome, GenerationExecutor};
use crate::store::Store;

const DEFAULT_BATCH_SIZE: i64 = 4;
const DEFAULT_INTERVAL_SECS: u64 = 10;
const DEFAULT_STALE_AFTER_SECS: u64 = 30 * 60;

/// Dispatch settings loaded from environment variables.
///
/// | Env Var                     | Default |
/// |-----------------------------|---------|
/// | `DISPATCH_BATCH_SIZE`       | `4`     |
/// | `DISPATCH_INTERVAL_SECS`    | `10`    |
/// | `DISPATCH_STALE_AFTER_SECS` | `1800`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum jobs claimed per invocation.
    pub batch_size: i64,
    /// Period of the scheduled loop.
    pub interval: Duration,
    /// Idle time after which a `processing` job is considered abandoned.
    pub stale_after: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let batch_size: i64 = std::env::var("DISPATCH_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let interval_secs: u64 = std::env::var("DISPATCH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_INTERVAL_SECS);

        let stale_after_secs: u64 = std::env::var("DISPATCH_STALE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_STALE_AFTER_SECS);

        Self {
            batch_size,
            interval: Duration::from_secs(interval_secs),
            stale_after: Duration::from_secs(stale_after_secs),
        }
    }
}

/// Tally of one dispatch invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Executions whose outcome could not be written. Those jobs stay
    /// `processing` until the stale sweep fails them.
    pub unrecorded: usize,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    executor: Arc<GenerationExecutor>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, executor: Arc<GenerationExecutor>, config: DispatchConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    /// Claim up to `batch_size` queued jobs and execute them concurrently.
    ///
    /// Finding nothing to do is not an error.
    pub async fn dispatch_once(&self) -> PipelineResult<DispatchSummary> {
        let claimed = self.store.claim_batch(self.config.batch_size).await?;
        if claimed.is_empty() {
            tracing::debug!("Dispatch found no queued jobs");
            return Ok(DispatchSummary::default());
        }

        tracing::info!(
            claimed = claimed.len(),
            job_ids = ?claimed.iter().map(|j| j.id).collect::<Vec<_>>(),
            "Jobs claimed",
        );
        for job in &claimed {
            self.executor.publish(job);
        }

        let outcomes = join_all(claimed.iter().map(|job| self.executor.execute(job))).await;

        let mut summary = DispatchSummary {
            processed: claimed.len(),
            ..DispatchSummary::default()
        };
        for (job, outcome) in claimed.iter().zip(outcomes) {
            match outcome {
                Ok(ExecutionOutcome::Done { .. }) => summary.successful += 1,
                Ok(ExecutionOutcome::Failed { .. }) => summary.failed += 1,
                Ok(ExecutionOutcome::Canceled) => summary.canceled += 1,
                Err(e) => {
                    tracing::error!(job_id = job.id, error = %e, "Recording job outcome failed");
                    summary.unrecorded += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            canceled = summary.canceled,
            unrecorded = summary.unrecorded,
            "Dispatch finished",
        );
        Ok(summary)
    }

    /// Fail every `processing` job idle for at least `stale_after`.
    pub async fn recover_stale(&self) -> PipelineResult<Vec<Job>> {
        let error = JobErrorInfo::new(
            error_codes::INTERNAL,
            format!(
                "Job made no progress for {}s and was abandoned",
                self.config.stale_after.as_secs()
            ),
        );
        let failed = self.store.fail_stale(self.config.stale_after, &error).await?;
        for job in &failed {
            tracing::warn!(job_id = job.id, "Stale processing job failed");
            self.executor.publish(job);
        }
        Ok(failed)
    }

    /// Every `interval` until `cancel` fires: sweep stale jobs, then run
    /// [`dispatch_once`](Self::dispatch_once).
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            stale_after_secs = self.config.stale_after.as_secs(),
            "Scheduled dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduled dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.recover_stale().await {
                        tracing::error!(error = %e, "Stale job sweep failed");
                    }
                    if let Err(e) = self.dispatch_once().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }
}
