use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use azure_provider::manifest::TargetManifest;
use azure_provider::types::{InitializeRequest, ProviderInfo, RequirementStatus, TargetConfig};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializeRequest>,
) -> Result<StatusCode, ApiError> {
    state.provider.initialize(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_info(State(state): State<AppState>) -> Json<ProviderInfo> {
    Json(state.provider.get_info())
}

pub async fn get_manifest(State(state): State<AppState>) -> Json<TargetManifest> {
    Json(state.provider.get_target_manifest())
}

pub async fn get_preset_target_configs(State(state): State<AppState>) -> Json<Vec<TargetConfig>> {
    Json(state.provider.get_preset_target_configs())
}

pub async fn check_requirements(State(state): State<AppState>) -> Json<Vec<RequirementStatus>> {
    Json(state.provider.check_requirements())
}
