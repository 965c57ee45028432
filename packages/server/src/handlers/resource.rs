use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::storage::BoxReader;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::resource::{
    DeleteResponse, FinalizeUploadRequest, ReconcileRequest, RenderRequest, RenderResponse,
    ResourceListQuery, ResourceListResponse, ResourceResponse, UploadTokenRequest,
};
use crate::models::shared::Pagination;
use crate::services::reconcile::ReferenceDiff;
use crate::services::resource::{ListQuery, SortKey};
use crate::services::upload::{UploadToken, Usage};
use crate::state::AppState;

/// Multipart overhead allowed on top of the configured upload size.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn local_upload_body_limit(max_upload_size: u64) -> DefaultBodyLimit {
    let limit = max_upload_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

fn parse_resource_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidId)
}

#[utoipa::path(
    post,
    path = "/token",
    tag = "Resources",
    operation_id = "requestUploadToken",
    summary = "Reserve a resource and obtain upload credentials",
    description = "Normalizes the file name, checks the storage quota, reserves a resource \
        record and returns backend-specific credentials. Requesting a token again for a path \
        that is still pending returns the same resource id.",
    request_body = UploadTokenRequest,
    responses(
        (status = 200, description = "Upload token", body = UploadToken),
        (status = 400, description = "Invalid file name (INVALID_NAME)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 409, description = "A finalized resource exists at this path (CONFLICT)", body = ErrorBody),
        (status = 413, description = "Quota exceeded (QUOTA_EXCEEDED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn request_upload_token(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UploadTokenRequest>,
) -> Result<Json<UploadToken>, AppError> {
    let token = state
        .uploads
        .request_upload_token(auth_user.user_id, &payload.file_name)
        .await?;
    Ok(Json(token))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Resources",
    operation_id = "localUpload",
    summary = "Upload bytes for a local-storage session",
    description = "Only available when the server stores resources on local disk. Expects \
        multipart fields `session` (from the upload token) and `file`, in that order; the \
        file is streamed to storage as it arrives. The resource is finalized with the \
        received size.",
    request_body(content_type = "multipart/form-data", description = "Session and file"),
    responses(
        (status = 201, description = "Resource uploaded", body = ResourceResponse),
        (status = 400, description = "Bad session or file (VALIDATION_ERROR, UNSUPPORTED_PROVIDER)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No reserved resource for the session (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn local_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut session: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("session") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read session: {e}")))?;
                session = Some(text);
            }
            Some("file") => {
                let session = session.take().ok_or_else(|| {
                    AppError::Validation("Missing 'session' field before 'file'".into())
                })?;
                let chunks = field.map_err(std::io::Error::other);
                let reader: BoxReader<'_> = Box::new(StreamReader::new(Box::pin(chunks)));

                let resource = state
                    .uploads
                    .local_upload(auth_user.user_id, session.trim(), reader)
                    .await?;
                return Ok((StatusCode::CREATED, Json(ResourceResponse::from(resource))));
            }
            _ => {} // Ignore unknown fields.
        }
    }

    Err(AppError::Validation("Missing 'file' field".into()))
}

#[utoipa::path(
    post,
    path = "/finalize",
    tag = "Resources",
    operation_id = "finalizeUpload",
    summary = "Report a completed direct upload",
    description = "Records the size of a resource the client uploaded straight to the \
        storage backend.",
    request_body = FinalizeUploadRequest,
    responses(
        (status = 200, description = "Finalized resource", body = ResourceResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No resource at this path (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn finalize_upload(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<FinalizeUploadRequest>,
) -> Result<Json<ResourceResponse>, AppError> {
    let resource = state
        .uploads
        .finalize(auth_user.user_id, &payload.path, payload.size)
        .await?;
    Ok(Json(resource.into()))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Resources",
    operation_id = "listResources",
    summary = "List the caller's resources",
    description = "Pages are 0-based. Sorted by update time unless `by_create` is set; \
        ties are broken by resource id in the same direction.",
    params(ResourceListQuery),
    responses(
        (status = 200, description = "Resource page", body = ResourceListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list_resources(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ResourceListQuery>,
) -> Result<Json<ResourceListResponse>, AppError> {
    let page = query.page.unwrap_or(0);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let sort = if query.by_create.unwrap_or(false) {
        SortKey::CreatedAt
    } else {
        SortKey::UpdatedAt
    };

    let total = state.resources.count(auth_user.user_id).await?;
    let data = state
        .resources
        .list(
            auth_user.user_id,
            ListQuery {
                page,
                page_size: per_page,
                sort,
                descending: query.desc.unwrap_or(true),
            },
        )
        .await?;

    Ok(Json(ResourceListResponse {
        data: data.into_iter().map(ResourceResponse::from).collect(),
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
        },
    }))
}

#[utoipa::path(
    get,
    path = "/usage",
    tag = "Resources",
    operation_id = "getUsage",
    summary = "Storage used against the plan capacity",
    responses(
        (status = 200, description = "Usage in bytes", body = Usage),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_usage(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Usage>, AppError> {
    Ok(Json(state.uploads.usage(auth_user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Resources",
    operation_id = "getResource",
    summary = "Get a resource by ID",
    params(("id" = String, Path, description = "Resource ID (UUID)")),
    responses(
        (status = 200, description = "Resource", body = ResourceResponse),
        (status = 400, description = "Malformed ID (INVALID_ID)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Not found or not owned (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResourceResponse>, AppError> {
    let id = parse_resource_id(&id)?;
    let resource = state.resources.get(auth_user.user_id, id).await?;
    Ok(Json(resource.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Resources",
    operation_id = "deleteResource",
    summary = "Delete an unreferenced resource",
    description = "Deletes the stored bytes and then the record. Fails while any memory \
        still embeds the resource. If the storage backend does not confirm deletion the \
        record is kept.",
    params(("id" = String, Path, description = "Resource ID (UUID)")),
    responses(
        (status = 200, description = "Resource deleted", body = DeleteResponse),
        (status = 400, description = "Malformed ID (INVALID_ID)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Still referenced (HAS_REFERENCE)", body = ErrorBody),
        (status = 502, description = "Backend deletion failed (DELETE_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = parse_resource_id(&id)?;
    state.resources.delete(auth_user.user_id, id).await?;
    Ok(Json(DeleteResponse { deleted: true }))
}

#[utoipa::path(
    put,
    path = "/references",
    tag = "Resources",
    operation_id = "reconcileReferences",
    summary = "Apply a memory content edit to resource references",
    description = "Called whenever a memory's content changes. Resources newly embedded by \
        the memory gain its id (a pending record is created for unknown paths); resources \
        no longer embedded lose it. Not atomic: on failure, retry with the same contents.",
    request_body = ReconcileRequest,
    responses(
        (status = 200, description = "Applied diff", body = ReferenceDiff),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn reconcile_references(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ReconcileRequest>,
) -> Result<Json<ReferenceDiff>, AppError> {
    let diff = state
        .reconciler
        .reconcile(
            auth_user.user_id,
            &payload.old_content,
            &payload.new_content,
            payload.memory_id,
        )
        .await?;
    Ok(Json(diff))
}

#[utoipa::path(
    post,
    path = "/render",
    tag = "Resources",
    operation_id = "renderContent",
    summary = "Rewrite embedded resource paths to fetchable URLs",
    description = "Embeds whose resource cannot be resolved keep their original path.",
    request_body = RenderRequest,
    responses(
        (status = 200, description = "Rewritten content", body = RenderResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn render_content(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<RenderRequest>,
) -> Result<Json<RenderResponse>, AppError> {
    let content = state
        .uploads
        .resolve_content(auth_user.user_id, &payload.content)
        .await;
    Ok(Json(RenderResponse { content }))
}
