use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::SuccessResponse;
use crate::routes::ApiError;
use crate::services::enhancement::CallbackOutcome;
use crate::services::signature::SIGNATURE_HEADER;

/// POST /api/v1/webhooks/ai-enhancement — completion callback from the enhancement service.
///
/// The signature covers the raw body, so the body is taken as bytes and only
/// parsed after verification. Stale, duplicate and unknown-image callbacks are
/// acknowledged with 200 so the sender stops redelivering.
pub async fn ai_enhancement(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.enhancement.verify_and_apply(&body, signature).await?;

    let message = match outcome {
        CallbackOutcome::Applied { image_id, status } => {
            tracing::info!(image_id = %image_id, status = %status, "Webhook processed");
            "Webhook processed successfully"
        }
        CallbackOutcome::StaleOrDuplicate { .. } => "Duplicate or stale webhook ignored",
        CallbackOutcome::UnknownImage => "Webhook for unknown image ignored",
    };

    Ok(Json(SuccessResponse::new(message)))
}
