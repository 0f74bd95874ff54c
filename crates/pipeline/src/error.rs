use atelier_core::error::CoreError;
use atelier_core::types::DbId;

use crate::store::StoreError;

/// Errors returned to callers of the pipeline services.
///
/// Job failures (provider errors, storage failures) are not errors here:
/// they are recorded on the job itself as `failed` with a typed code.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The caller's owner scope does not exist.
    #[error("Owner scope {0} could not be resolved")]
    UnresolvedScope(DbId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn job_not_found(id: DbId) -> Self {
        Self::Core(CoreError::NotFound { entity: "Job", id })
    }
}
