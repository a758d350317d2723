use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::db::store::StoreError;
use crate::services::auth::AuthError;
use crate::services::enhancement::EnhancementError;
use crate::services::storage::StorageError;

pub mod health;
pub mod images;
pub mod metrics;
pub mod middleware;
pub mod webhooks;

/// Application routes with rate limiting and request tracing.
///
/// `/metrics` is mounted separately by the binary since it carries its own state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/admin/properties/{property_id}/images",
            post(images::upload_image),
        )
        .route(
            "/api/v1/admin/images/{image_id}",
            get(images::get_image).delete(images::delete_image),
        )
        .route(
            "/api/v1/admin/images/{image_id}/enhance",
            post(images::enhance_image),
        )
        .route(
            "/api/v1/webhooks/ai-enhancement",
            post(webhooks::ai_enhancement),
        )
        // Multipart overhead on top of the largest accepted file.
        .layer(DefaultBodyLimit::max(
            state.uploads.max_file_size_bytes + 64 * 1024,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors surfaced by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type")
            }
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "invalid_state"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<EnhancementError> for ApiError {
    fn from(err: EnhancementError) -> Self {
        match err {
            EnhancementError::ImageNotFound(_) => ApiError::NotFound(err.to_string()),
            EnhancementError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
            EnhancementError::UpstreamUnavailable(_) => ApiError::BadGateway(err.to_string()),
            EnhancementError::InvalidSignature(_) => ApiError::Unauthorized(err.to_string()),
            EnhancementError::MalformedCallback(_) => ApiError::BadRequest(err.to_string()),
            EnhancementError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Forbidden => ApiError::Forbidden(err.to_string()),
            AuthError::Jwt(e) => ApiError::Internal(e.to_string()),
        }
    }
}
