use std::collections::HashMap;

use async_trait::async_trait;

use super::ResourceError;

/// Source of each owner's storage plan.
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    /// Capacity in bytes the owner's plan allows.
    async fn plan_capacity(&self, owner_id: i32) -> Result<i64, ResourceError>;
}

/// Capacities from configuration: one default plus per-owner overrides.
#[derive(Debug, Clone)]
pub struct StaticQuota {
    default_capacity: i64,
    overrides: HashMap<i32, i64>,
}

impl StaticQuota {
    pub fn new(default_capacity: i64, overrides: HashMap<i32, i64>) -> Self {
        Self {
            default_capacity,
            overrides,
        }
    }
}

#[async_trait]
impl QuotaProvider for StaticQuota {
    async fn plan_capacity(&self, owner_id: i32) -> Result<i64, ResourceError> {
        Ok(self
            .overrides
            .get(&owner_id)
            .copied()
            .unwrap_or(self.default_capacity))
    }
}
