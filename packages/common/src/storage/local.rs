use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::error::StorageError;
use super::key::validate_object_key;
use super::traits::{BoxReader, Provider, StorageBackend, StoredObject, UploadCredentials};

/// Upper bound on session lifetime (one week).
const MAX_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// A pending direct upload: the session grants a write to exactly one key.
#[derive(Debug, Clone)]
struct PendingUpload {
    key: String,
    expires_at: DateTime<Utc>,
}

/// Local-disk storage backend.
///
/// Objects live at `{root}/{key}`. Clients obtain a single-use session from
/// [`StorageBackend::issue_upload_token`] and hand the bytes to the server,
/// which writes them through [`StorageBackend::accept_local_upload`].
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
    max_size: u64,
    session_ttl: Duration,
    sessions: DashMap<String, PendingUpload>,
}

impl LocalStorage {
    /// Create a new local store, creating `root` if needed.
    pub async fn new(
        root: PathBuf,
        public_url: String,
        max_size: u64,
        session_ttl_secs: u64,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_size,
            session_ttl: Duration::seconds(session_ttl_secs.min(MAX_SESSION_TTL_SECS) as i64),
            sessions: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_object_key(key)?;
        Ok(self.root.join(key))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.root
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    fn purge_expired_sessions(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, pending| pending.expires_at > now);
    }

    async fn write_atomically(
        &self,
        target: &Path,
        reader: BoxReader<'_>,
    ) -> Result<u64, StorageError> {
        let temp_path = self.temp_path();
        let total_bytes = match self.spool(&temp_path, reader).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let Err(e) = fs::rename(&temp_path, target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(total_bytes)
    }

    /// Copy `reader` into a fresh file at `temp_path`, enforcing the size limit.
    async fn spool(
        &self,
        temp_path: &Path,
        mut reader: BoxReader<'_>,
    ) -> Result<u64, StorageError> {
        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];
        let mut temp_file = fs::File::create(temp_path).await?;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        Ok(total_bytes)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn provider(&self) -> Provider {
        Provider::Local
    }

    async fn issue_upload_token(&self, key: &str) -> Result<UploadCredentials, StorageError> {
        validate_object_key(key)?;
        self.purge_expired_sessions();

        let session = hex::encode(rand::random::<[u8; 32]>());
        let expires_at = Utc::now() + self.session_ttl;
        self.sessions.insert(
            session.clone(),
            PendingUpload {
                key: key.to_string(),
                expires_at,
            },
        );
        debug!(key, "Issued local upload session");

        Ok(UploadCredentials::Local {
            session,
            expires_at,
        })
    }

    async fn accept_local_upload(
        &self,
        session: &str,
        key_prefix: &str,
        reader: BoxReader<'_>,
    ) -> Result<StoredObject, StorageError> {
        let (_, pending) = self
            .sessions
            .remove_if(session, |_, pending| pending.key.starts_with(key_prefix))
            .ok_or(StorageError::InvalidSession)?;
        if pending.expires_at <= Utc::now() {
            return Err(StorageError::InvalidSession);
        }

        let target = self.object_path(&pending.key)?;
        let size = self.write_atomically(&target, reader).await?;

        Ok(StoredObject {
            key: pending.key,
            size,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            // Reserved resources never received bytes.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_url(&self, key: &str) -> Result<String, StorageError> {
        let path = self.object_path(key)?;
        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("{}/{}", self.public_url, key))
    }
}
