//! Artifact store: opaque binary object storage for generated media.
//!
//! Backends implement [`ArtifactStore`]. Writes may not be visible to a
//! read issued right after them, so readers above this layer retry.
//! A missing container (bucket or root directory) is reported as its own
//! error kind so the uploader can provision it once and retry.

pub mod config;
pub mod error;
pub mod keys;
pub mod local;
pub mod memory;
pub mod s3;

use async_trait::async_trait;

pub use config::StorageConfig;
pub use error::StorageError;
pub use local::LocalArtifactStore;
pub use memory::MemoryArtifactStore;
pub use s3::S3ArtifactStore;

/// A binary object store addressed by string keys.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Durably write `bytes` under `key`, overwriting any previous object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// Read the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create the backing container. Succeeds if it already exists.
    async fn provision(&self) -> Result<(), StorageError>;

    /// Client-resolvable location for a stored key.
    fn location(&self, key: &str) -> String;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
