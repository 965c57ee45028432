use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::warn;

use super::error::StorageError;
use super::key::validate_object_key;
use super::traits::{Provider, StorageBackend, UploadCredentials};
use crate::config::S3Config;

/// S3 rejects presigned URLs valid for more than seven days.
const MAX_PRESIGN_SECS: u64 = 604_800;

/// S3-compatible object storage backend.
///
/// Clients upload straight to the bucket through presigned `PUT` URLs.
pub struct S3Storage {
    bucket: Box<Bucket>,
    upload_expiry_secs: u32,
    download_expiry_secs: u32,
    public_url: Option<String>,
}

impl S3Storage {
    pub fn new(
        config: &S3Config,
        upload_ttl_secs: u64,
        request_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Remote(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Remote(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::Remote(e.to_string()))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }
        bucket.set_request_timeout(Some(request_timeout));

        Ok(Self {
            bucket,
            upload_expiry_secs: upload_ttl_secs.min(MAX_PRESIGN_SECS) as u32,
            download_expiry_secs: config.presign_expiry_secs.min(MAX_PRESIGN_SECS as u32),
            public_url: config
                .public_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn provider(&self) -> Provider {
        Provider::S3
    }

    async fn issue_upload_token(&self, key: &str) -> Result<UploadCredentials, StorageError> {
        validate_object_key(key)?;
        let url = self
            .bucket
            .presign_put(key, self.upload_expiry_secs, None, None)
            .await
            .map_err(|e| StorageError::Remote(e.to_string()))?;

        Ok(UploadCredentials::S3 {
            url,
            method: "PUT".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(i64::from(self.upload_expiry_secs)),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<bool, StorageError> {
        validate_object_key(key)?;
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| StorageError::Remote(e.to_string()))?;

        match response.status_code() {
            200..=299 | 404 => Ok(true),
            status => {
                warn!(key, status, "Object store refused deletion");
                Ok(false)
            }
        }
    }

    async fn resolve_url(&self, key: &str) -> Result<String, StorageError> {
        validate_object_key(key)?;
        if let Some(base) = &self.public_url {
            return Ok(format!("{base}/{key}"));
        }
        self.bucket
            .presign_get(key, self.download_expiry_secs, None)
            .await
            .map_err(|e| StorageError::Remote(e.to_string()))
    }
}
