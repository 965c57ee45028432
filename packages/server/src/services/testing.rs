//! Test doubles shared by the service tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::storage::{
    BoxReader, Provider, StorageBackend, StorageError, StoredObject, UploadCredentials,
};
use sea_orm::DatabaseConnection;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;
use uuid::Uuid;

use super::ResourceError;
use super::cache::{CacheError, LruResourceCache, ResourceCache};
use super::quota::QuotaProvider;
use super::resource::{Resource, ResourceStore};
use crate::database::init_db;

/// Parks the first task that passes through it until the test opens it.
/// Later passes go straight through.
pub struct Gate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub fn armed() -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    /// Wait until a task is parked at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// In-memory backend. Sessions are `session:{key}`; keys containing
/// `missing` cannot be resolved.
pub struct FakeStorage {
    provider: Provider,
    delete_succeeds: AtomicBool,
    deleted: Mutex<Vec<String>>,
    delete_gate: Option<Arc<Gate>>,
}

impl FakeStorage {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delete_succeeds: AtomicBool::new(true),
            deleted: Mutex::new(Vec::new()),
            delete_gate: None,
        })
    }

    /// A local backend whose first `delete_object` waits at `gate`.
    pub fn with_delete_gate(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            provider: Provider::Local,
            delete_succeeds: AtomicBool::new(true),
            deleted: Mutex::new(Vec::new()),
            delete_gate: Some(gate),
        })
    }

    pub fn fail_deletes(&self) {
        self.delete_succeeds.store(false, Ordering::SeqCst);
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageBackend for FakeStorage {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn issue_upload_token(&self, key: &str) -> Result<UploadCredentials, StorageError> {
        let expires_at = Utc::now() + Duration::minutes(15);
        Ok(match self.provider {
            Provider::Local => UploadCredentials::Local {
                session: format!("session:{key}"),
                expires_at,
            },
            Provider::S3 => UploadCredentials::S3 {
                url: format!("https://bucket.test/{key}?sig=abc"),
                method: "PUT".into(),
                expires_at,
            },
        })
    }

    async fn accept_local_upload(
        &self,
        session: &str,
        key_prefix: &str,
        mut reader: BoxReader<'_>,
    ) -> Result<StoredObject, StorageError> {
        if self.provider != Provider::Local {
            return Err(StorageError::UnsupportedProvider(self.provider));
        }
        let key = session
            .strip_prefix("session:")
            .filter(|key| key.starts_with(key_prefix))
            .ok_or(StorageError::InvalidSession)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(StoredObject {
            key: key.to_string(),
            size: buf.len() as u64,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<bool, StorageError> {
        if let Some(gate) = &self.delete_gate {
            gate.pass().await;
        }
        if !self.delete_succeeds.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(true)
    }

    async fn resolve_url(&self, key: &str) -> Result<String, StorageError> {
        if key.contains("missing") {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("https://cdn.test/{key}"))
    }
}

/// A cache whose invalidation always fails.
pub struct BrokenCache;

#[async_trait]
impl ResourceCache for BrokenCache {
    async fn get(&self, _id: Uuid) -> Option<Resource> {
        None
    }

    async fn generation(&self) -> u64 {
        0
    }

    async fn put(&self, _resource: Resource, _generation: u64) {}

    async fn invalidate(&self, _id: Uuid) -> Result<(), CacheError> {
        Err(CacheError("connection refused".into()))
    }
}

/// An LRU cache whose first `put` waits at `gate`.
pub struct GatedCache {
    inner: LruResourceCache,
    gate: Arc<Gate>,
}

impl GatedCache {
    pub fn new(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            inner: LruResourceCache::new(16),
            gate,
        })
    }
}

#[async_trait]
impl ResourceCache for GatedCache {
    async fn get(&self, id: Uuid) -> Option<Resource> {
        self.inner.get(id).await
    }

    async fn generation(&self) -> u64 {
        self.inner.generation().await
    }

    async fn put(&self, resource: Resource, generation: u64) {
        self.gate.pass().await;
        self.inner.put(resource, generation).await;
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), CacheError> {
        self.inner.invalidate(id).await
    }
}

/// Every owner gets the same capacity.
pub struct FixedQuota(pub i64);

#[async_trait]
impl QuotaProvider for FixedQuota {
    async fn plan_capacity(&self, _owner_id: i32) -> Result<i64, ResourceError> {
        Ok(self.0)
    }
}

pub async fn test_db() -> DatabaseConnection {
    init_db("sqlite::memory:")
        .await
        .expect("in-memory database should initialize")
}

pub async fn store_with(
    storage: Arc<dyn StorageBackend>,
    cache: Arc<dyn ResourceCache>,
) -> ResourceStore {
    ResourceStore::new(test_db().await, storage, cache)
}

/// A store over a fresh database with a local fake backend and an LRU cache.
pub async fn local_store() -> (ResourceStore, Arc<FakeStorage>) {
    let storage = FakeStorage::new(Provider::Local);
    let store = store_with(storage.clone(), Arc::new(LruResourceCache::new(16))).await;
    (store, storage)
}
