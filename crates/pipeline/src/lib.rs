//! The asynchronous generation pipeline.
//!
//! Jobs flow `queued -> processing -> done | failed | canceled`:
//!
//! - [`SubmissionService`] validates a request and persists it as `queued`.
//! - [`Dispatcher`] atomically claims queued jobs and runs them through
//!   the [`GenerationExecutor`], which calls the provider, uploads the
//!   artifacts, and records assets.
//! - [`CancellationHandler`] cancels jobs that have not finished yet.
//! - [`JobQueries`] serves read-only status and asset lookups.
//!
//! Persistence goes through the [`Store`] trait: [`PgStore`] in
//! production, [`MemoryStore`] in tests and local runs.

pub mod cancellation;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod memory;
pub mod pg;
pub mod queries;
pub mod store;
pub mod submission;

use std::sync::Arc;

use atelier_events::EventBus;
use atelier_provider::ProviderRegistry;
use atelier_storage::ArtifactStore;

pub use cancellation::{CancelOutcome, CancellationHandler};
pub use dispatcher::{DispatchConfig, DispatchSummary, Dispatcher};
pub use error::{PipelineError, PipelineResult};
pub use executor::{ExecutionOutcome, ExecutorConfig, GenerationExecutor};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use queries::JobQueries;
pub use store::{AssetStore, JobStore, Store, StoreError};
pub use submission::SubmissionService;

/// Every pipeline service wired to one store, provider registry, artifact
/// store, and event bus.
#[derive(Clone)]
pub struct Pipeline {
    pub submission: Arc<SubmissionService>,
    pub dispatcher: Arc<Dispatcher>,
    pub cancellation: Arc<CancellationHandler>,
    pub queries: Arc<JobQueries>,
    pub events: Arc<EventBus>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        providers: ProviderRegistry,
        artifacts: Arc<dyn ArtifactStore>,
        events: Arc<EventBus>,
        dispatch: DispatchConfig,
        executor: ExecutorConfig,
    ) -> Self {
        let executor = Arc::new(GenerationExecutor::new(
            Arc::clone(&store),
            providers.clone(),
            Arc::clone(&artifacts),
            Arc::clone(&events),
            executor,
        ));

        Self {
            submission: Arc::new(SubmissionService::new(
                Arc::clone(&store),
                providers,
                Arc::clone(&events),
            )),
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&store), executor, dispatch)),
            cancellation: Arc::new(CancellationHandler::new(
                Arc::clone(&store),
                Arc::clone(&events),
            )),
            queries: Arc::new(JobQueries::new(store, artifacts)),
            events,
        }
    }
}
