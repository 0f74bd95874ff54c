/// Errors from artifact store backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The bucket or root directory does not exist yet.
    #[error("Storage container missing: {0}")]
    ContainerMissing(String),

    /// No object under the requested key.
    #[error("Artifact not found: {0}")]
    NotFound(String),

    /// Local filesystem failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure (network, permissions, throttling).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_container_missing(&self) -> bool {
        matches!(self, Self::ContainerMissing(_))
    }
}
