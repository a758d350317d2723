use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome reported by the enhancement service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    #[serde(alias = "failure")]
    Failed,
}

/// Body of `POST /api/v1/webhooks/ai-enhancement`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnhancementCallback {
    #[garde(length(min = 1, max = 255))]
    pub job_id: String,

    #[garde(skip)]
    pub status: CallbackStatus,

    /// Retrievable reference to the enhanced asset. Required on success.
    #[garde(length(min = 1, max = 2048))]
    pub enhanced_image_url: Option<String>,

    #[garde(skip)]
    pub processing_time_seconds: Option<u64>,

    #[garde(length(max = 2000))]
    pub error_message: Option<String>,

    /// Our image id, when the service echoes it back.
    #[garde(skip)]
    #[serde(default)]
    pub image_id: Option<Uuid>,
}
