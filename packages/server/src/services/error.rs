use common::storage::{Provider, StorageError};
use sea_orm::DbErr;
use thiserror::Error;

/// Failures of the resource store, reconciler and upload orchestrator.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found")]
    NotFound,

    #[error("a finalized resource already exists at '{0}'")]
    Conflict(String),

    #[error("resource belongs to another user")]
    PermissionDenied,

    #[error("resource is still referenced by {0} memories")]
    HasReference(u64),

    #[error("storage quota exceeded ({used} of {capacity} bytes used)")]
    QuotaExceeded { used: i64, capacity: i64 },

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("invalid upload size: {0} bytes")]
    InvalidSize(u64),

    #[error("operation not supported by the {0} storage provider")]
    UnsupportedProvider(Provider),

    #[error("storage backend did not delete the object")]
    DeleteFailed,

    #[error("authentication required")]
    Unauthenticated,

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<StorageError> for ResourceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnsupportedProvider(provider) => Self::UnsupportedProvider(provider),
            StorageError::InvalidKey(msg) => Self::InvalidName(msg),
            other => Self::Storage(other),
        }
    }
}
