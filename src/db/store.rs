use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::models::image::{
    EnhancementEvent, EnhancementStatus, NewImage, PropertyImage, Resolution,
};

/// Persistence for image records.
///
/// The three transition methods are conditional writes: the guard and the
/// write happen as one operation, and `Ok(None)` means the guard did not hold.
/// No other method changes `status`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn insert(&self, image: NewImage) -> Result<PropertyImage, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<PropertyImage>, StoreError>;

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<PropertyImage>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn property_exists(&self, property_id: Uuid) -> Result<bool, StoreError>;

    /// Move to `processing` from any state that accepts [`EnhancementEvent::Requested`].
    async fn begin_processing(
        &self,
        id: Uuid,
        job_id: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError>;

    /// Apply a callback outcome if the image is `processing` under `job_id`.
    async fn resolve(
        &self,
        id: Uuid,
        job_id: &str,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError>;

    /// Move to `timeout` if the image is `processing` and was requested before `cutoff`.
    async fn time_out(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError>;

    /// Images in `processing` requested before `cutoff`, oldest first.
    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<PropertyImage>, StoreError>;

    async fn count_by_status(&self) -> Result<Vec<(EnhancementStatus, i64)>, StoreError>;

    /// Active listings grouped by property type.
    async fn active_property_counts(&self) -> Result<Vec<(String, i64)>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt image record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("Injected store failure for {0}")]
    Injected(Uuid),
}

#[derive(Debug, Clone)]
struct PropertyRow {
    property_type: String,
    is_active: bool,
}

#[derive(Default)]
struct MemoryState {
    images: HashMap<Uuid, PropertyImage>,
    properties: HashMap<Uuid, PropertyRow>,
    failing: HashSet<Uuid>,
    next_order: i32,
}

/// In-process [`ImageStore`] for tests and local development.
///
/// A single mutex serializes every operation, so each conditional write is atomic.
#[derive(Default)]
pub struct MemoryImageStore {
    state: Mutex<MemoryState>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an active property and return its id.
    pub fn add_property(&self, property_type: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().properties.insert(
            id,
            PropertyRow {
                property_type: property_type.to_string(),
                is_active: true,
            },
        );
        id
    }

    pub fn deactivate_property(&self, id: Uuid) {
        if let Some(row) = self.lock().properties.get_mut(&id) {
            row.is_active = false;
        }
    }

    /// Make every transition write for `id` fail with [`StoreError::Injected`].
    pub fn fail_writes_for(&self, id: Uuid) {
        self.lock().failing.insert(id);
    }

    fn check_failure(state: &MemoryState, id: Uuid) -> Result<(), StoreError> {
        if state.failing.contains(&id) {
            return Err(StoreError::Injected(id));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn insert(&self, image: NewImage) -> Result<PropertyImage, StoreError> {
        let mut state = self.lock();
        let display_order = state.next_order;
        state.next_order += 1;

        let record = PropertyImage {
            id: Uuid::new_v4(),
            property_id: image.property_id,
            original_url: image.original_url,
            original_key: image.original_key,
            enhanced_url: None,
            enhanced_key: None,
            image_type: image.image_type,
            is_primary: image.is_primary,
            display_order,
            status: EnhancementStatus::Pending,
            job_id: None,
            enhancement_error: None,
            created_at: Utc::now(),
            requested_at: None,
            resolved_at: None,
        };
        state.images.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PropertyImage>, StoreError> {
        Ok(self.lock().images.get(&id).cloned())
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<PropertyImage>, StoreError> {
        Ok(self
            .lock()
            .images
            .values()
            .find(|image| image.job_id.as_deref() == Some(job_id))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().images.remove(&id).is_some())
    }

    async fn property_exists(&self, property_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().properties.contains_key(&property_id))
    }

    async fn begin_processing(
        &self,
        id: Uuid,
        job_id: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let mut state = self.lock();
        Self::check_failure(&state, id)?;

        let Some(image) = state.images.get_mut(&id) else {
            return Ok(None);
        };
        if !EnhancementEvent::Requested.sources().contains(&image.status) {
            return Ok(None);
        }

        image.status = EnhancementStatus::Processing;
        image.job_id = Some(job_id.to_string());
        image.requested_at = Some(requested_at);
        image.resolved_at = None;
        image.enhancement_error = None;
        Ok(Some(image.clone()))
    }

    async fn resolve(
        &self,
        id: Uuid,
        job_id: &str,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let mut state = self.lock();
        Self::check_failure(&state, id)?;

        let Some(image) = state.images.get_mut(&id) else {
            return Ok(None);
        };
        if !image.awaits_job(job_id) {
            return Ok(None);
        }

        image.status = resolution.event().target();
        image.resolved_at = Some(resolved_at);
        match resolution {
            Resolution::Completed { url, key } => {
                image.enhanced_url = Some(url);
                image.enhanced_key = Some(key);
            }
            Resolution::Failed { reason } => {
                image.enhancement_error = Some(reason);
            }
        }
        Ok(Some(image.clone()))
    }

    async fn time_out(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let mut state = self.lock();
        Self::check_failure(&state, id)?;

        let Some(image) = state.images.get_mut(&id) else {
            return Ok(None);
        };
        let stale = image.requested_at.is_some_and(|at| at < cutoff);
        if image.status != EnhancementStatus::Processing || !stale {
            return Ok(None);
        }

        image.status = EnhancementStatus::Timeout;
        image.resolved_at = Some(resolved_at);
        image.enhancement_error = Some("No callback received before timeout".to_string());
        Ok(Some(image.clone()))
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<PropertyImage>, StoreError> {
        let mut stuck: Vec<PropertyImage> = self
            .lock()
            .images
            .values()
            .filter(|image| {
                image.status == EnhancementStatus::Processing
                    && image.requested_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect();
        stuck.sort_by_key(|image| image.requested_at);
        Ok(stuck)
    }

    async fn count_by_status(&self) -> Result<Vec<(EnhancementStatus, i64)>, StoreError> {
        let state = self.lock();
        let mut counts: HashMap<EnhancementStatus, i64> = HashMap::new();
        for image in state.images.values() {
            *counts.entry(image.status).or_default() += 1;
        }
        Ok(EnhancementStatus::ALL
            .into_iter()
            .filter_map(|status| counts.get(&status).map(|count| (status, *count)))
            .collect())
    }

    async fn active_property_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let state = self.lock();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in state.properties.values().filter(|row| row.is_active) {
            *counts.entry(row.property_type.clone()).or_default() += 1;
        }
        let mut counts: Vec<(String, i64)> = counts.into_iter().collect();
        counts.sort();
        Ok(counts)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
