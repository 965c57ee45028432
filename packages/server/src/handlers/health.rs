use axum::extract::State;
use axum::http::StatusCode;

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "health",
    summary = "Liveness and database connectivity",
    responses(
        (status = 204, description = "Healthy"),
        (status = 500, description = "Database unreachable (INTERNAL_ERROR)"),
    ),
)]
pub async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.db.ping().await?;
    Ok(StatusCode::NO_CONTENT)
}
