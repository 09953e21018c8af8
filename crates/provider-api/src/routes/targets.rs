use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use azure_provider::types::TargetRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_target(
    State(state): State<AppState>,
    Json(req): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    state.provider.create_target(&req).await?;
    Ok(StatusCode::CREATED)
}

pub async fn start_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_same_target(&id, &req)?;
    state.provider.start_target(&req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_same_target(&id, &req)?;
    state.provider.stop_target(&req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn destroy_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TargetRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_same_target(&id, &req)?;
    state.provider.destroy_target(&req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_target_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_same_target(&id, &req)?;
    let metadata = state.provider.get_target_metadata(&req).await?;
    Ok(([(CONTENT_TYPE, "application/json")], metadata))
}

fn ensure_same_target(path_id: &str, req: &TargetRequest) -> Result<(), ApiError> {
    if req.target.id != path_id {
        return Err(ApiError::BadRequest(format!(
            "target id in path ({path_id}) does not match request body ({})",
            req.target.id
        )));
    }
    Ok(())
}
