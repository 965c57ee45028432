use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::shared::Pagination;
use crate::services::resource::Resource;

/// Response DTO for a single resource.
#[derive(Serialize, ToSchema)]
pub struct ResourceResponse {
    /// Resource ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: Uuid,
    /// Path within the owner's namespace.
    #[schema(example = "holiday.png")]
    pub path: String,
    /// Size in bytes; 0 while the upload is pending.
    #[schema(example = 142857)]
    pub size: i64,
    /// Whether the upload has not been finalized yet.
    pub reserved: bool,
    /// Memories embedding this resource.
    pub refs: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Resource> for ResourceResponse {
    fn from(resource: Resource) -> Self {
        Self {
            reserved: resource.is_reserved(),
            id: resource.id,
            path: resource.path,
            size: resource.size,
            refs: resource.refs.into_iter().collect(),
            created_at: resource.created_at,
            updated_at: resource.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResourceListResponse {
    pub data: Vec<ResourceResponse>,
    pub pagination: Pagination,
}

/// Query parameters for listing resources.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResourceListQuery {
    /// Page number, 0-based. Default: 0.
    pub page: Option<u64>,
    /// Items per page (1-100). Default: 20.
    pub per_page: Option<u64>,
    /// Sort by creation time instead of last update. Default: false.
    pub by_create: Option<bool>,
    /// Newest first. Default: true.
    pub desc: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct UploadTokenRequest {
    #[schema(example = "holiday photo.png")]
    pub file_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct FinalizeUploadRequest {
    /// Path returned with the upload token.
    #[schema(example = "holiday_photo.png")]
    pub path: String,
    /// Uploaded size in bytes.
    #[schema(example = 142857)]
    pub size: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct ReconcileRequest {
    pub memory_id: Uuid,
    /// Memory content before the edit; empty for a new memory.
    #[serde(default)]
    pub old_content: String,
    /// Memory content after the edit; empty for a deleted memory.
    #[serde(default)]
    pub new_content: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RenderRequest {
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct RenderResponse {
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: bool,
}
