use std::collections::HashMap;

use common::config::StorageAppConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    /// Plan capacity in bytes for owners without an override.
    pub default_capacity: i64,
    /// Per-owner capacities keyed by owner id.
    #[serde(default)]
    pub overrides: HashMap<String, i64>,
}

impl QuotaConfig {
    /// Overrides with owner ids parsed; unparsable keys are skipped.
    pub fn owner_overrides(&self) -> HashMap<i32, i64> {
        self.overrides
            .iter()
            .filter_map(|(owner, capacity)| match owner.parse::<i32>() {
                Ok(owner) => Some((owner, *capacity)),
                Err(_) => {
                    tracing::warn!("Ignoring quota override for invalid owner id '{owner}'");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached resources.
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageAppConfig,
    pub quota: QuotaConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("database.url", "sqlite://memox.db?mode=rwc")?
            .set_default("quota.default_capacity", 1024 * 1024 * 1024)?
            .set_default("cache.capacity", 10_000)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., MEMOX__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("MEMOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
