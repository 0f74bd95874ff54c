use std::sync::Arc;

use crate::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore, S3ArtifactStore};

/// Which artifact backend to build, loaded from environment variables.
///
/// | Env Var                   | Default            |
/// |---------------------------|--------------------|
/// | `STORAGE_BACKEND`         | `local`            |
/// | `STORAGE_LOCAL_ROOT`      | `./data/artifacts` |
/// | `STORAGE_PUBLIC_BASE_URL` | unset              |
/// | `S3_BUCKET`               | `atelier-artifacts`|
/// | `S3_ENDPOINT`             | unset              |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local {
        root: String,
        public_base_url: Option<String>,
    },
    S3 {
        bucket: String,
        endpoint: Option<String>,
        public_base_url: Option<String>,
    },
    Memory,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let public_base_url = std::env::var("STORAGE_PUBLIC_BASE_URL").ok();
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());

        match backend.as_str() {
            "s3" => Self::S3 {
                bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "atelier-artifacts".into()),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                public_base_url,
            },
            "memory" => Self::Memory,
            "local" => Self::Local {
                root: std::env::var("STORAGE_LOCAL_ROOT")
                    .unwrap_or_else(|_| "./data/artifacts".into()),
                public_base_url,
            },
            other => panic!("STORAGE_BACKEND must be one of local, s3, memory (got '{other}')"),
        }
    }

    /// Construct the configured backend.
    pub async fn build(&self) -> Arc<dyn ArtifactStore> {
        match self {
            Self::Local {
                root,
                public_base_url,
            } => Arc::new(LocalArtifactStore::new(root, public_base_url.clone())),
            Self::S3 {
                bucket,
                endpoint,
                public_base_url,
            } => Arc::new(
                S3ArtifactStore::connect(bucket.clone(), endpoint.clone(), public_base_url.clone())
                    .await,
            ),
            Self::Memory => Arc::new(MemoryArtifactStore::new()),
        }
    }
}
