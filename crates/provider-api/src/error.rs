use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Provider(#[from] azure_provider::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Provider(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Provider(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Provider(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Provider(azure_provider::Error::NotInitialized) => StatusCode::CONFLICT,
            ApiError::Provider(azure_provider::Error::Metadata(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
