use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use super::error::StorageError;

/// Type alias for a boxed async reader, possibly borrowing from a request.
pub type BoxReader<'a> = Box<dyn AsyncRead + Unpin + Send + 'a>;

/// Storage backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    S3,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::S3 => f.write_str("s3"),
        }
    }
}

/// Backend-native credentials a client needs to upload one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum UploadCredentials {
    /// Single-use session accepted by the server's direct upload endpoint.
    Local {
        session: String,
        expires_at: DateTime<Utc>,
    },
    /// Presigned URL the client sends the bytes to.
    S3 {
        url: String,
        method: String,
        expires_at: DateTime<Utc>,
    },
}

/// An object written by a direct upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

/// Object storage behind the resource store.
///
/// Objects are addressed by backend-relative keys (see [`super::object_key`]).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which variant this backend is.
    fn provider(&self) -> Provider;

    /// Issue credentials that allow writing exactly the object at `key`.
    async fn issue_upload_token(&self, key: &str) -> Result<UploadCredentials, StorageError>;

    /// Accept bytes for a previously issued upload session.
    ///
    /// The session must grant a key starting with `key_prefix`, which scopes
    /// sessions to the caller's namespace. Only the local variant supports this.
    async fn accept_local_upload(
        &self,
        session: &str,
        key_prefix: &str,
        reader: BoxReader<'_>,
    ) -> Result<StoredObject, StorageError> {
        let _ = (session, key_prefix, reader);
        Err(StorageError::UnsupportedProvider(self.provider()))
    }

    /// Delete an object.
    ///
    /// Returns `true` if the object is gone afterwards (including when it never
    /// existed), `false` if the backend refused the deletion.
    async fn delete_object(&self, key: &str) -> Result<bool, StorageError>;

    /// Externally fetchable URL for an object.
    async fn resolve_url(&self, key: &str) -> Result<String, StorageError>;
}
