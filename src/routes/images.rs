use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::str::FromStr;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{EnhanceResponse, ImageStatusResponse, ImageUploadResponse, SuccessResponse};
use crate::models::image::{ImageType, NewImage};
use crate::routes::middleware::AdminUser;
use crate::routes::ApiError;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

struct UploadForm {
    file_name: String,
    data: Vec<u8>,
    image_type: ImageType,
    is_primary: bool,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut image_type = ImageType::default();
    let mut is_primary = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
                file = Some((file_name, data.to_vec()));
            }
            "image_type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                image_type = ImageType::from_str(text.trim())
                    .map_err(|_| ApiError::BadRequest(format!("Unknown image_type '{text}'")))?;
            }
            "is_primary" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                is_primary = text
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid is_primary '{text}'")))?;
            }
            _ => {}
        }
    }

    let (file_name, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'image' file field".to_string()))?;

    Ok(UploadForm {
        file_name,
        data,
        image_type,
        is_primary,
    })
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

fn storage_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// POST /api/v1/admin/properties/{property_id}/images — upload a listing photo.
pub async fn upload_image(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImageUploadResponse>), ApiError> {
    let form = read_upload_form(multipart).await?;

    let extension = extension_of(&form.file_name)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid file type. Allowed types: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

    if form.data.len() > state.uploads.max_file_size_bytes {
        return Err(ApiError::BadRequest(format!(
            "File too large. Maximum size: {}MB",
            state.uploads.max_file_size_bytes / (1024 * 1024)
        )));
    }

    let content_type = match image::guess_format(&form.data) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => {
            return Err(ApiError::UnsupportedMediaType(
                "Upload is not a JPEG, PNG or WebP image".to_string(),
            ))
        }
    };

    if !state.images.property_exists(property_id).await? {
        return Err(ApiError::NotFound(format!(
            "Property with ID {property_id} not found"
        )));
    }

    let key = format!(
        "original/{property_id}/{}_{}",
        Uuid::new_v4(),
        storage_name(&form.file_name)
    );
    let url = state.storage.put(&key, &form.data, content_type).await?;

    let image = match state
        .images
        .insert(NewImage {
            property_id,
            original_url: url,
            original_key: key.clone(),
            image_type: form.image_type,
            is_primary: form.is_primary,
        })
        .await
    {
        Ok(image) => image,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        image_id = %image.id,
        property_id = %property_id,
        extension = %extension,
        bytes = form.data.len(),
        uploaded_by = %admin.sub,
        "Image uploaded"
    );

    Ok((StatusCode::CREATED, Json(ImageUploadResponse::from(&image))))
}

/// GET /api/v1/admin/images/{image_id} — current enhancement state.
pub async fn get_image(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
) -> Result<Json<ImageStatusResponse>, ApiError> {
    let image = state
        .images
        .get(image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Image with ID {image_id} not found")))?;
    Ok(Json(image.into()))
}

/// DELETE /api/v1/admin/images/{image_id} — remove the record and its stored objects.
pub async fn delete_image(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let image = state
        .images
        .get(image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Image with ID {image_id} not found")))?;

    for key in std::iter::once(&image.original_key).chain(image.enhanced_key.as_ref()) {
        if let Err(e) = state.storage.delete(key).await {
            tracing::warn!(image_id = %image_id, key = %key, error = %e, "Failed to delete stored object");
        }
    }

    state.images.delete(image_id).await?;
    tracing::info!(image_id = %image_id, "Image deleted");

    Ok(Json(SuccessResponse::new("Image deleted successfully")))
}

/// POST /api/v1/admin/images/{image_id}/enhance — submit the image for AI enhancement.
pub async fn enhance_image(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
) -> Result<Json<EnhanceResponse>, ApiError> {
    let image = state.enhancement.request_enhancement(image_id).await?;

    tracing::info!(image_id = %image_id, requested_by = %admin.sub, "Enhancement triggered");

    Ok(Json(EnhanceResponse {
        id: image.id,
        ai_job_id: image.job_id.unwrap_or_default(),
        status: image.status,
        message: "Enhancement request submitted successfully".to_string(),
    }))
}
