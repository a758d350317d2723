use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Enhancement status of a property image.
///
/// `Completed`, `Failed` and `Timeout` end a request cycle. `Failed` and
/// `Timeout` may start a new cycle through [`EnhancementEvent::Requested`].
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnhancementStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

/// Events that drive the enhancement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementEvent {
    /// Operator requested (or re-requested) enhancement and the remote accepted it.
    Requested,
    /// Verified success callback for the current job.
    Succeeded,
    /// Verified failure callback for the current job.
    Failed,
    /// Reconciler gave up waiting for a callback.
    TimedOut,
}

impl EnhancementStatus {
    pub const ALL: [EnhancementStatus; 5] = [
        EnhancementStatus::Pending,
        EnhancementStatus::Processing,
        EnhancementStatus::Completed,
        EnhancementStatus::Failed,
        EnhancementStatus::Timeout,
    ];

    /// Transition table. `None` means the event is illegal from this state.
    pub fn next(self, event: EnhancementEvent) -> Option<EnhancementStatus> {
        use EnhancementEvent as E;
        use EnhancementStatus as S;

        match (self, event) {
            (S::Pending | S::Failed | S::Timeout, E::Requested) => Some(S::Processing),
            (S::Processing, E::Succeeded) => Some(S::Completed),
            (S::Processing, E::Failed) => Some(S::Failed),
            (S::Processing, E::TimedOut) => Some(S::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnhancementStatus::Completed | EnhancementStatus::Failed | EnhancementStatus::Timeout
        )
    }
}

impl EnhancementEvent {
    /// States from which this event is accepted, derived from [`EnhancementStatus::next`].
    ///
    /// Stores use this as the guard of their conditional writes.
    pub fn sources(self) -> Vec<EnhancementStatus> {
        EnhancementStatus::ALL
            .into_iter()
            .filter(|status| status.next(self).is_some())
            .collect()
    }

    /// Target state of this event. Every event has exactly one target.
    pub fn target(self) -> EnhancementStatus {
        match self {
            EnhancementEvent::Requested => EnhancementStatus::Processing,
            EnhancementEvent::Succeeded => EnhancementStatus::Completed,
            EnhancementEvent::Failed => EnhancementStatus::Failed,
            EnhancementEvent::TimedOut => EnhancementStatus::Timeout,
        }
    }
}

/// Listing photo category.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageType {
    FrontExterior,
    Interior,
    FloorPlan,
    #[default]
    Other,
}

/// A stored listing image and its enhancement bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyImage {
    pub id: Uuid,
    pub property_id: Uuid,
    pub original_url: String,
    pub original_key: String,
    /// Set if and only if `status` is `Completed`.
    pub enhanced_url: Option<String>,
    pub enhanced_key: Option<String>,
    pub image_type: ImageType,
    pub is_primary: bool,
    pub display_order: i32,
    pub status: EnhancementStatus,
    /// Set once the image has left `Pending`.
    pub job_id: Option<String>,
    pub enhancement_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub requested_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PropertyImage {
    /// Whether a callback for `job_id` may still transition this image.
    pub fn awaits_job(&self, job_id: &str) -> bool {
        self.status == EnhancementStatus::Processing && self.job_id.as_deref() == Some(job_id)
    }
}

/// Fields needed to create an image record after upload.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub property_id: Uuid,
    pub original_url: String,
    pub original_key: String,
    pub image_type: ImageType,
    pub is_primary: bool,
}

/// Outcome written by a verified callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed { url: String, key: String },
    Failed { reason: String },
}

impl Resolution {
    pub fn event(&self) -> EnhancementEvent {
        match self {
            Resolution::Completed { .. } => EnhancementEvent::Succeeded,
            Resolution::Failed { .. } => EnhancementEvent::Failed,
        }
    }
}
