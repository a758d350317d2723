use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::image::{EnhancementStatus, ImageType, PropertyImage};

/// Response after uploading an image.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub original_url: String,
    pub image_type: ImageType,
    pub enhancement_status: EnhancementStatus,
}

impl From<&PropertyImage> for ImageUploadResponse {
    fn from(image: &PropertyImage) -> Self {
        Self {
            id: image.id,
            property_id: image.property_id,
            original_url: image.original_url.clone(),
            image_type: image.image_type,
            enhancement_status: image.status,
        }
    }
}

/// Response after triggering enhancement.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnhanceResponse {
    pub id: Uuid,
    pub ai_job_id: String,
    pub status: EnhancementStatus,
    pub message: String,
}

/// Full view of an image's enhancement state.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageStatusResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub status: EnhancementStatus,
    pub original_url: String,
    pub enhanced_url: Option<String>,
    pub job_id: Option<String>,
    pub error: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<PropertyImage> for ImageStatusResponse {
    fn from(image: PropertyImage) -> Self {
        Self {
            id: image.id,
            property_id: image.property_id,
            status: image.status,
            original_url: image.original_url,
            enhanced_url: image.enhanced_url,
            job_id: image.job_id,
            error: image.enhancement_error,
            requested_at: image.requested_at,
            resolved_at: image.resolved_at,
        }
    }
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
