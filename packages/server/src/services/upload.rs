use std::collections::HashMap;
use std::sync::Arc;

use common::storage::{BoxReader, Provider, StorageBackend, UploadCredentials, object_key};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ResourceError;
use super::quota::QuotaProvider;
use super::reference::{extract_references, rewrite_references};
use super::resource::{Resource, ResourceStore};
use crate::utils::filename::normalize_upload_name;

/// What a client needs to upload one file.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UploadToken {
    /// Id of the reserved resource.
    pub resource_id: Uuid,
    /// Normalized path the resource is stored under.
    pub path: String,
    #[serde(flatten)]
    pub credentials: UploadCredentials,
}

/// Bytes used against the plan capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Usage {
    pub used: i64,
    pub capacity: i64,
}

/// Quota-checked front door for uploads.
#[derive(Clone)]
pub struct UploadOrchestrator {
    store: ResourceStore,
    storage: Arc<dyn StorageBackend>,
    quota: Arc<dyn QuotaProvider>,
}

impl UploadOrchestrator {
    pub fn new(
        store: ResourceStore,
        storage: Arc<dyn StorageBackend>,
        quota: Arc<dyn QuotaProvider>,
    ) -> Self {
        Self {
            store,
            storage,
            quota,
        }
    }

    pub fn provider(&self) -> Provider {
        self.storage.provider()
    }

    /// Reserve a resource for `file_name` and issue backend upload credentials.
    ///
    /// The quota is checked once, here. Concurrent uploads may together
    /// overshoot it; finalization does not re-check.
    #[instrument(skip(self))]
    pub async fn request_upload_token(
        &self,
        owner_id: i32,
        file_name: &str,
    ) -> Result<UploadToken, ResourceError> {
        let path = normalize_upload_name(file_name)
            .map_err(|e| ResourceError::InvalidName(e.message().into()))?;

        let usage = self.usage(owner_id).await?;
        if usage.used > usage.capacity {
            return Err(ResourceError::QuotaExceeded {
                used: usage.used,
                capacity: usage.capacity,
            });
        }

        let credentials = self
            .storage
            .issue_upload_token(&object_key(owner_id, &path))
            .await?;
        let resource_id = self.store.reserve(owner_id, &path).await?;

        info!(%resource_id, path, "Issued upload token");
        Ok(UploadToken {
            resource_id,
            path,
            credentials,
        })
    }

    /// Record completion of an out-of-band upload.
    pub async fn finalize(
        &self,
        owner_id: i32,
        path: &str,
        size: u64,
    ) -> Result<Resource, ResourceError> {
        let id = self.store.finalize_size(owner_id, path, size).await?;
        self.store.get(owner_id, id).await
    }

    /// Accept the bytes of a local-backend upload session and finalize it.
    #[instrument(skip(self, session, reader))]
    pub async fn local_upload(
        &self,
        owner_id: i32,
        session: &str,
        reader: BoxReader<'_>,
    ) -> Result<Resource, ResourceError> {
        if self.storage.provider() != Provider::Local {
            return Err(ResourceError::UnsupportedProvider(self.storage.provider()));
        }

        let prefix = object_key(owner_id, "");
        let stored = self
            .storage
            .accept_local_upload(session, &prefix, reader)
            .await?;
        let Some(path) = stored.key.strip_prefix(&prefix) else {
            warn!(owner_id, key = stored.key, "Backend stored upload outside owner namespace");
            return Err(ResourceError::PermissionDenied);
        };

        self.finalize(owner_id, path, stored.size).await
    }

    /// Current usage and plan capacity.
    pub async fn usage(&self, owner_id: i32) -> Result<Usage, ResourceError> {
        let used = self.store.total_used_bytes(owner_id).await?;
        let capacity = self.quota.plan_capacity(owner_id).await?;
        Ok(Usage { used, capacity })
    }

    /// Rewrite embedded references in `content` to fetchable URLs.
    ///
    /// References the backend cannot resolve are left as they are.
    pub async fn resolve_content(&self, owner_id: i32, content: &str) -> String {
        let mut urls = HashMap::new();
        for path in extract_references(content) {
            match self
                .storage
                .resolve_url(&object_key(owner_id, &path))
                .await
            {
                Ok(url) => {
                    urls.insert(path, url);
                }
                Err(e) => warn!(path, "Leaving unresolved reference: {e}"),
            }
        }
        rewrite_references(content, &urls)
    }
}
