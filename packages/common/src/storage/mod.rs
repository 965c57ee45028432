mod error;
mod key;
mod traits;

pub mod local;
#[cfg(feature = "object-storage")]
pub mod s3;

use std::sync::Arc;

pub use error::StorageError;
pub use key::{object_key, validate_object_key};
pub use traits::{BoxReader, Provider, StorageBackend, StoredObject, UploadCredentials};

use crate::config::StorageAppConfig;

/// Build the storage backend selected by `config.provider`.
pub async fn build_storage(
    config: &StorageAppConfig,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match config.provider {
        Provider::Local => {
            let store = local::LocalStorage::new(
                config.local.root.clone(),
                config.local.public_url.clone(),
                config.max_upload_size,
                config.upload_token_ttl_secs,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        Provider::S3 => {
            let store = s3::S3Storage::new(
                &config.s3,
                config.upload_token_ttl_secs,
                std::time::Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "object-storage"))]
        Provider::S3 => Err(StorageError::UnsupportedProvider(Provider::S3)),
    }
}
