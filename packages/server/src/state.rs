use std::sync::Arc;

use common::storage::StorageBackend;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::services::cache::ResourceCache;
use crate::services::quota::QuotaProvider;
use crate::services::reconcile::ReferenceReconciler;
use crate::services::resource::ResourceStore;
use crate::services::upload::UploadOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub resources: ResourceStore,
    pub reconciler: ReferenceReconciler,
    pub uploads: UploadOrchestrator,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        storage: Arc<dyn StorageBackend>,
        cache: Arc<dyn ResourceCache>,
        quota: Arc<dyn QuotaProvider>,
    ) -> Self {
        let resources = ResourceStore::new(db.clone(), storage.clone(), cache);
        Self {
            config: Arc::new(config),
            db,
            reconciler: ReferenceReconciler::new(resources.clone()),
            uploads: UploadOrchestrator::new(resources.clone(), storage, quota),
            resources,
        }
    }
}
