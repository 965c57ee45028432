use super::error::StorageError;

/// Object key under which an owner's resource is stored: `{owner_id}/{path}`.
pub fn object_key(owner_id: i32, path: &str) -> String {
    format!("{owner_id}/{path}")
}

/// Reject keys that could escape the storage root or address hidden files.
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".into()));
    }
    if key.contains('\0') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "key contains forbidden characters: {key:?}"
        )));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!("key is absolute: {key}")));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(StorageError::InvalidKey(format!(
                "key has an empty, hidden or traversal segment: {key}"
            )));
        }
    }
    Ok(())
}
