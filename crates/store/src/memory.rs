//! In-memory blob store for tests.

use crate::client::{BlobStore, StoreStatus};
use crate::error::NO_STATUS;
use crate::object::CachedObject;
use crate::{Result, StoreError};
use async_trait::async_trait;
use sccache_timing::Timer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// [`BlobStore`] keeping compressed objects in a map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    reject_puts: Option<u16>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    status: AtomicI32,
}

impl MemoryBlobStore {
    /// Empty store accepting every write.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: AtomicI32::new(NO_STATUS),
            ..Default::default()
        }
    }

    /// Empty store answering every write with `status`.
    #[must_use]
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_puts: Some(status),
            ..Self::new()
        }
    }

    /// Whether an object is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `get` calls so far.
    #[must_use]
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `put` calls so far.
    #[must_use]
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str, _timer: &mut Timer) -> Option<CachedObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let found = self.lock().get(key).cloned();
        self.status
            .store(if found.is_some() { 200 } else { 404 }, Ordering::SeqCst);
        found.map(CachedObject::Compressed)
    }

    async fn put(&self, key: &str, object: &CachedObject, _timer: &mut Timer) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.reject_puts {
            self.status.store(i32::from(status), Ordering::SeqCst);
            return Err(StoreError::http_status("PUT", format!("memory:///{key}"), status));
        }
        let compressed = object.compressed()?.into_owned();
        self.lock().insert(key.to_string(), compressed);
        self.status.store(200, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> StoreStatus {
        StoreStatus {
            code: self.status.load(Ordering::SeqCst),
            name: "memory".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryBlobStore::new();
        let mut timer = Timer::new();
        assert!(store.get("k", &mut timer).await.is_none());
        assert_eq!(store.status().code, 404);

        store
            .put("k", &CachedObject::Object(b"obj".to_vec()), &mut timer)
            .await
            .unwrap();
        let fetched = store.get("k", &mut timer).await.unwrap();
        assert_eq!(fetched.object().unwrap().as_ref(), b"obj");
        assert_eq!((store.gets(), store.puts(), store.len()), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_rejecting_store() {
        let store = MemoryBlobStore::rejecting(503);
        let err = store
            .put("k", &CachedObject::Object(Vec::new()), &mut Timer::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 503);
        assert!(store.is_empty());
    }
}
