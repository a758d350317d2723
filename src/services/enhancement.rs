//! Image enhancement workflow.
//!
//! Operators request enhancement of an uploaded image, the remote service
//! accepts the job, and its outcome later arrives through a signed webhook.
//! All status changes go through the guarded writes of [`ImageStore`], so a late
//! callback, a duplicate delivery and a concurrent timeout sweep cannot
//! double-transition the same record.

use chrono::Utc;
use garde::Validate;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{ImageStore, StoreError};
use crate::models::image::{EnhancementEvent, EnhancementStatus, PropertyImage, Resolution};
use crate::models::webhook::{CallbackStatus, EnhancementCallback};
use crate::services::enhancer::{EnhancementClient, EnhancementJob, EnhancerError};
use crate::services::signature::{SignatureError, WebhookVerifier};
use crate::services::storage::ObjectStore;

const DEFAULT_FAILURE_REASON: &str = "Enhancement failed";

/// Result of applying a verified callback. Every variant is acknowledged to the sender.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The callback moved the image to `status`.
    Applied {
        image_id: Uuid,
        status: EnhancementStatus,
    },
    /// The job id no longer matches or the image is not `processing`.
    StaleOrDuplicate {
        image_id: Uuid,
        status: EnhancementStatus,
    },
    /// No image matches the callback.
    UnknownImage,
}

#[derive(Debug, thiserror::Error)]
pub enum EnhancementError {
    #[error("Image {0} not found")]
    ImageNotFound(Uuid),

    #[error("Image {id} cannot be enhanced from status '{status}'")]
    InvalidState {
        id: Uuid,
        status: EnhancementStatus,
    },

    #[error("Enhancement service unavailable: {0}")]
    UpstreamUnavailable(#[source] EnhancerError),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct EnhancementService {
    store: Arc<dyn ImageStore>,
    client: Arc<dyn EnhancementClient>,
    objects: Arc<dyn ObjectStore>,
    verifier: WebhookVerifier,
    webhook_url: String,
}

impl EnhancementService {
    pub fn new(
        store: Arc<dyn ImageStore>,
        client: Arc<dyn EnhancementClient>,
        objects: Arc<dyn ObjectStore>,
        verifier: WebhookVerifier,
        webhook_url: String,
    ) -> Self {
        Self {
            store,
            client,
            objects,
            verifier,
            webhook_url,
        }
    }

    /// Submit `image_id` to the enhancement service and move it to `processing`.
    ///
    /// Allowed from `pending`, `failed` and `timeout`. When the service is
    /// unreachable or rejects the job nothing is written and the call may be retried.
    pub async fn request_enhancement(
        &self,
        image_id: Uuid,
    ) -> Result<PropertyImage, EnhancementError> {
        let image = self
            .store
            .get(image_id)
            .await?
            .ok_or(EnhancementError::ImageNotFound(image_id))?;

        if image.status.next(EnhancementEvent::Requested).is_none() {
            return Err(EnhancementError::InvalidState {
                id: image_id,
                status: image.status,
            });
        }

        let job = EnhancementJob {
            image_url: image.original_url.clone(),
            job_id: image_id.to_string(),
            webhook_url: self.webhook_url.clone(),
        };

        let ai_job_id = self.client.submit(&job).await.map_err(|e| {
            tracing::error!(image_id = %image_id, error = %e, "Enhancement request failed");
            EnhancementError::UpstreamUnavailable(e)
        })?;

        let Some(updated) = self
            .store
            .begin_processing(image_id, &ai_job_id, Utc::now())
            .await?
        else {
            // Another request won the race; the job we just submitted is orphaned
            // and its callback will be discarded as stale.
            let status = self
                .store
                .get(image_id)
                .await?
                .map(|current| current.status)
                .ok_or(EnhancementError::ImageNotFound(image_id))?;
            tracing::warn!(
                image_id = %image_id,
                ai_job_id = %ai_job_id,
                status = %status,
                "Image changed state while requesting enhancement"
            );
            return Err(EnhancementError::InvalidState {
                id: image_id,
                status,
            });
        };

        metrics::counter!("image_enhancement_status_total", "status" => "processing")
            .increment(1);
        tracing::info!(image_id = %image_id, ai_job_id = %ai_job_id, "Enhancement requested");

        Ok(updated)
    }

    /// Authenticate a raw webhook body and apply it.
    ///
    /// An invalid signature never reaches the store.
    pub async fn verify_and_apply(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackOutcome, EnhancementError> {
        if let Err(e) = self.verifier.verify(body, signature) {
            tracing::warn!(
                security_event = true,
                error = %e,
                "Rejected webhook with invalid signature"
            );
            return Err(e.into());
        }

        let callback: EnhancementCallback = serde_json::from_slice(body)
            .map_err(|e| EnhancementError::MalformedCallback(e.to_string()))?;
        callback
            .validate()
            .map_err(|report| EnhancementError::MalformedCallback(report.to_string()))?;

        self.apply_callback(callback).await
    }

    /// Apply an already authenticated callback.
    pub async fn apply_callback(
        &self,
        callback: EnhancementCallback,
    ) -> Result<CallbackOutcome, EnhancementError> {
        let image = match callback.image_id {
            Some(image_id) => self.store.get(image_id).await?,
            None => self.store.find_by_job_id(&callback.job_id).await?,
        };

        let Some(image) = image else {
            tracing::warn!(
                job_id = %callback.job_id,
                image_id = ?callback.image_id,
                "Webhook references unknown image"
            );
            return Ok(CallbackOutcome::UnknownImage);
        };

        if !image.awaits_job(&callback.job_id) {
            tracing::info!(
                image_id = %image.id,
                job_id = %callback.job_id,
                status = %image.status,
                "Ignoring stale or duplicate webhook"
            );
            return Ok(CallbackOutcome::StaleOrDuplicate {
                image_id: image.id,
                status: image.status,
            });
        }

        let resolution = match callback.status {
            CallbackStatus::Success => {
                let url = callback.enhanced_image_url.as_deref().ok_or_else(|| {
                    EnhancementError::MalformedCallback(
                        "success callback without enhanced_image_url".to_string(),
                    )
                })?;
                self.persist_enhanced(&image, &callback.job_id, url).await
            }
            CallbackStatus::Failed => Resolution::Failed {
                reason: callback
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            },
        };

        let written_key = match &resolution {
            Resolution::Completed { key, .. } => Some(key.clone()),
            Resolution::Failed { .. } => None,
        };

        let Some(updated) = self
            .store
            .resolve(image.id, &callback.job_id, resolution, Utc::now())
            .await?
        else {
            let current = self.store.get(image.id).await?;
            let status = current.as_ref().map_or(image.status, |current| current.status);

            // Another delivery of this job may already own the same key.
            if let Some(key) = written_key {
                let owned = current
                    .as_ref()
                    .is_some_and(|current| current.enhanced_key.as_deref() == Some(key.as_str()));
                if !owned {
                    if let Err(e) = self.objects.delete(&key).await {
                        tracing::warn!(
                            image_id = %image.id,
                            key = %key,
                            error = %e,
                            "Failed to remove enhanced object after losing transition race"
                        );
                    }
                }
            }

            tracing::info!(
                image_id = %image.id,
                job_id = %callback.job_id,
                status = %status,
                "Webhook lost race to another transition"
            );
            return Ok(CallbackOutcome::StaleOrDuplicate {
                image_id: image.id,
                status,
            });
        };

        metrics::counter!(
            "image_enhancement_status_total",
            "status" => updated.status.to_string()
        )
        .increment(1);
        if let Some(seconds) = callback.processing_time_seconds {
            metrics::histogram!("image_enhancement_duration_seconds").record(seconds as f64);
        }

        match updated.status {
            EnhancementStatus::Completed => tracing::info!(
                image_id = %updated.id,
                job_id = %callback.job_id,
                processing_time = ?callback.processing_time_seconds,
                "Enhancement completed"
            ),
            _ => tracing::warn!(
                image_id = %updated.id,
                job_id = %callback.job_id,
                error = ?updated.enhancement_error,
                "Enhancement failed"
            ),
        }

        Ok(CallbackOutcome::Applied {
            image_id: updated.id,
            status: updated.status,
        })
    }

    /// Copy the remote asset into our storage. Any failure becomes a `failed` resolution.
    async fn persist_enhanced(&self, image: &PropertyImage, job_id: &str, url: &str) -> Resolution {
        let bytes = match self.client.fetch_result(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(image_id = %image.id, error = %e, "Failed to download enhanced image");
                return Resolution::Failed {
                    reason: format!("Failed to download enhanced image: {e}"),
                };
            }
        };

        let (extension, content_type) = sniff_format(&bytes);
        let key = enhanced_key(image.id, job_id, extension);

        match self.objects.put(&key, &bytes, content_type).await {
            Ok(url) => Resolution::Completed { url, key },
            Err(e) => {
                tracing::error!(image_id = %image.id, error = %e, "Failed to store enhanced image");
                Resolution::Failed {
                    reason: format!("Failed to store enhanced image: {e}"),
                }
            }
        }
    }
}

fn sniff_format(bytes: &[u8]) -> (&'static str, &'static str) {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => ("png", "image/png"),
        Ok(image::ImageFormat::WebP) => ("webp", "image/webp"),
        _ => ("jpg", "image/jpeg"),
    }
}

/// Storage key for an enhanced asset. Duplicate deliveries of one job map to the same key.
fn enhanced_key(image_id: Uuid, job_id: &str, extension: &str) -> String {
    let safe_job: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("enhanced/{image_id}/{safe_job}.{extension}")
}
