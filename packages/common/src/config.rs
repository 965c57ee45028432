use std::path::PathBuf;

use serde::Deserialize;

use crate::storage::Provider;

/// App-level storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageAppConfig {
    /// Which backend stores resource bytes. Default: local.
    #[serde(default = "default_provider")]
    pub provider: Provider,
    /// Largest accepted direct upload in bytes. Default: 32 MiB.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Lifetime of upload sessions and presigned upload URLs. Default: 900.
    #[serde(default = "default_upload_token_ttl_secs")]
    pub upload_token_ttl_secs: u64,
    /// Per-request timeout for remote object store calls. Default: 30.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub s3: S3Config,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalStorageConfig {
    /// Directory holding uploaded files. Default: "./data/resources".
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
    /// Base URL under which the server exposes `root`. Default: "/files".
    #[serde(default = "default_local_public_url")]
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub path_style: bool,
    /// Expiry of presigned download URLs. Default: 3600.
    #[serde(default = "default_presign_expiry_secs")]
    pub presign_expiry_secs: u32,
    /// Public base URL; when set, download URLs are not presigned.
    pub public_url: Option<String>,
}

fn default_provider() -> Provider {
    Provider::Local
}
fn default_max_upload_size() -> u64 {
    32 * 1024 * 1024
}
fn default_upload_token_ttl_secs() -> u64 {
    900
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_local_root() -> PathBuf {
    PathBuf::from("./data/resources")
}
fn default_local_public_url() -> String {
    "/files".into()
}
fn default_presign_expiry_secs() -> u32 {
    3600
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: default_local_root(),
            public_url: default_local_public_url(),
        }
    }
}

impl Default for StorageAppConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_upload_size: default_max_upload_size(),
            upload_token_ttl_secs: default_upload_token_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            local: LocalStorageConfig::default(),
            s3: S3Config::default(),
        }
    }
}
