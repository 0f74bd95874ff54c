//! Local-filesystem artifact store.
//!
//! The root directory plays the role of the container: if it is absent,
//! writes fail with [`StorageError::ContainerMissing`] instead of silently
//! creating it, so provisioning stays an explicit step.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::ArtifactStore;

pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalArtifactStore {
    /// * `root` - directory that holds every artifact.
    /// * `public_base_url` - when set, locations are `{base}/{key}`
    ///   (e.g. served by a static file server); otherwise `file://` paths.
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root, refusing anything that would escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::Backend(format!("Invalid artifact key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if !tokio::fs::try_exists(&self.root).await? {
            return Err(StorageError::ContainerMissing(self.root.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file and rename so readers never observe
        // a partially written artifact.
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(key, bytes = bytes.len(), "Artifact written to local storage");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn provision(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tracing::info!(root = %self.root.display(), "Provisioned local artifact root");
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("file://{}", self.root.join(key).display()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
