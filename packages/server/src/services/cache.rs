use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;
use uuid::Uuid;

use super::resource::Resource;

#[derive(Debug, Error)]
#[error("resource cache unavailable: {0}")]
pub struct CacheError(pub String);

/// Derived, rebuildable view of resources keyed by id.
///
/// Entries are invalidated on every mutation and never updated in place.
/// A read-through load takes a [`generation`](ResourceCache::generation)
/// before reading the database and hands it back to `put`; the put is
/// dropped if any invalidation happened in between.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<Resource>;

    async fn generation(&self) -> u64;

    async fn put(&self, resource: Resource, generation: u64);

    async fn invalidate(&self, id: Uuid) -> Result<(), CacheError>;
}

/// In-process LRU cache.
pub struct LruResourceCache {
    // Reads bump recency, so they take the lock too.
    inner: Mutex<Inner>,
}

struct Inner {
    entries: LruCache<Uuid, Resource>,
    /// Bumped by every invalidation.
    generation: u64,
}

impl LruResourceCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CacheError> {
        self.inner
            .lock()
            .map_err(|_| CacheError("cache lock poisoned".into()))
    }
}

#[async_trait]
impl ResourceCache for LruResourceCache {
    async fn get(&self, id: Uuid) -> Option<Resource> {
        self.lock().ok()?.entries.get(&id).cloned()
    }

    async fn generation(&self) -> u64 {
        // A poisoned lock never matches, so the later put is dropped.
        self.lock().map(|inner| inner.generation).unwrap_or(u64::MAX)
    }

    async fn put(&self, resource: Resource, generation: u64) {
        if let Ok(mut inner) = self.lock()
            && inner.generation == generation
        {
            inner.entries.put(resource.id, resource);
        }
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        inner.generation = inner.generation.wrapping_add(1);
        inner.entries.pop(&id);
        Ok(())
    }
}
