//! In-process artifact store for development and tests.
//!
//! Besides plain storage it can simulate the failure modes the uploader
//! has to handle: a missing container and a number of transient write
//! failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::ArtifactStore;

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

pub struct MemoryArtifactStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    container_present: AtomicBool,
    provision_fails: AtomicBool,
    failing_puts: AtomicU32,
    successes_left: AtomicU32,
    put_attempts: AtomicU32,
    provision_calls: AtomicU32,
}

impl MemoryArtifactStore {
    /// A store whose container already exists.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            container_present: AtomicBool::new(true),
            provision_fails: AtomicBool::new(false),
            failing_puts: AtomicU32::new(0),
            successes_left: AtomicU32::new(u32::MAX),
            put_attempts: AtomicU32::new(0),
            provision_calls: AtomicU32::new(0),
        }
    }

    /// A store that reports `ContainerMissing` until provisioned.
    pub fn without_container() -> Self {
        let store = Self::new();
        store.container_present.store(false, Ordering::SeqCst);
        store
    }

    /// Make the next `n` writes fail with a backend error.
    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Let `n` more writes succeed, then fail every write after that.
    pub fn fail_puts_after(&self, n: u32) {
        self.successes_left.store(n, Ordering::SeqCst);
    }

    /// Make provisioning fail.
    pub fn fail_provisioning(&self) {
        self.provision_fails.store(true, Ordering::SeqCst);
    }

    pub fn put_attempts(&self) -> u32 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn provision_calls(&self) -> u32 {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Content type recorded for `key`, if stored.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.container_present.load(Ordering::SeqCst) {
            return Err(StorageError::ContainerMissing("memory".into()));
        }

        let injected = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Backend("injected write failure".into()));
        }

        let allowed = self
            .successes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                u32::MAX => Some(n),
                _ => n.checked_sub(1),
            })
            .is_ok();
        if !allowed {
            return Err(StorageError::Backend("write quota exhausted".into()));
        }

        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn provision(&self) -> Result<(), StorageError> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        if self.provision_fails.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("provisioning refused".into()));
        }
        self.container_present.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryArtifactStore::new();
        store.fail_next_puts(2);

        assert!(store.put("a", b"1", "image/png").await.is_err());
        assert!(store.put("a", b"1", "image/png").await.is_err());
        assert!(store.put("a", b"1", "image/png").await.is_ok());
        assert_eq!(store.put_attempts(), 3);
        assert_eq!(store.get("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn writes_fail_once_quota_is_spent() {
        let store = MemoryArtifactStore::new();
        store.fail_puts_after(1);

        assert!(store.put("a", b"1", "image/png").await.is_ok());
        assert!(store.put("b", b"2", "image/png").await.is_err());
        assert!(store.put("b", b"2", "image/png").await.is_err());
        assert_eq!(store.object_count().await, 1);
    }

    #[tokio::test]
    async fn container_missing_until_provisioned() {
        let store = MemoryArtifactStore::without_container();
        assert_matches!(
            store.put("a", b"1", "image/png").await,
            Err(StorageError::ContainerMissing(_))
        );
        store.provision().await.unwrap();
        assert!(store.put("a", b"1", "image/png").await.is_ok());
        assert_eq!(store.content_type("a").await.as_deref(), Some("image/png"));
    }
}
