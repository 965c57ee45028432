pub mod config;
pub mod storage;

pub use storage::{Provider, StorageBackend, StorageError, StoredObject, UploadCredentials};
