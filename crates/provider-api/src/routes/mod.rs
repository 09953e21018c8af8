pub mod provider;
pub mod targets;


use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Provider
        .route("/initialize", post(provider::initialize))
        .route("/info", get(provider::get_info))
        .route("/manifest", get(provider::get_manifest))
        .route("/preset-target-configs", get(provider::get_preset_target_configs))
        .route("/requirements", get(provider::check_requirements))
        // Target lifecycle
        .route("/targets", post(targets::create_target))
        .route("/targets/{id}", delete(targets::destroy_target))
        .route("/targets/{id}/start", post(targets::start_target))
        .route("/targets/{id}/stop", post(targets::stop_target))
        .route("/targets/{id}/metadata", post(targets::get_target_metadata))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
