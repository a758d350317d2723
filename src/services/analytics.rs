use std::sync::Arc;

use crate::db::store::{ImageStore, StoreError};
use crate::models::image::EnhancementStatus;

#[derive(Debug, Default, PartialEq)]
pub struct AnalyticsSnapshot {
    /// Images currently awaiting a callback.
    pub queue_length: i64,
    pub active_properties: Vec<(String, i64)>,
}

/// Refresh listing and enhancement gauges.
pub async fn aggregate(store: &Arc<dyn ImageStore>) -> Result<AnalyticsSnapshot, StoreError> {
    let statuses = store.count_by_status().await?;
    let queue_length = statuses
        .iter()
        .find(|(status, _)| *status == EnhancementStatus::Processing)
        .map_or(0, |(_, count)| *count);

    metrics::gauge!("image_enhancement_queue_length").set(queue_length as f64);
    for (status, count) in &statuses {
        metrics::gauge!("image_enhancement_images", "status" => status.to_string())
            .set(*count as f64);
    }

    let active_properties = store.active_property_counts().await?;
    for (property_type, count) in &active_properties {
        metrics::gauge!("active_properties_total", "property_type" => property_type.clone())
            .set(*count as f64);
    }

    tracing::info!(
        queue_length = queue_length,
        property_types = active_properties.len(),
        "Analytics aggregated"
    );

    Ok(AnalyticsSnapshot {
        queue_length,
        active_properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryImageStore;
    use crate::models::image::{ImageType, NewImage};
    use chrono::Utc;

    #[tokio::test]
    async fn test_queue_length_counts_processing_only() {
        let memory = Arc::new(MemoryImageStore::new());
        let property = memory.add_property("villa");
        for i in 0..3 {
            let image = memory
                .insert(NewImage {
                    property_id: property,
                    original_url: format!("https://cdn/{i}.jpg"),
                    original_key: format!("{i}.jpg"),
                    image_type: ImageType::Interior,
                    is_primary: false,
                })
                .await
                .unwrap();
            if i < 2 {
                memory
                    .begin_processing(image.id, &format!("J{i}"), Utc::now())
                    .await
                    .unwrap();
            }
        }

        let store: Arc<dyn ImageStore> = memory;
        let snapshot = aggregate(&store).await.unwrap();
        assert_eq!(snapshot.queue_length, 2);
        assert_eq!(snapshot.active_properties, vec![("villa".to_string(), 1)]);
    }
}
