use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::db::store::{ImageStore, StoreError};
use crate::models::image::{
    EnhancementEvent, EnhancementStatus, ImageType, NewImage, PropertyImage, Resolution,
};

const IMAGE_COLUMNS: &str = r#"
    id, property_id, original_url, original_key, enhanced_url, enhanced_key,
    image_type, is_primary, display_order, enhancement_status, ai_job_id,
    enhancement_error, created_at, enhancement_requested_at, enhancement_resolved_at
"#;

/// Postgres-backed [`ImageStore`]. Every transition is a single guarded `UPDATE … RETURNING`.
#[derive(Clone)]
pub struct PgImageStore {
    pool: PgPool,
}

impl PgImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn status_list(event: EnhancementEvent) -> Vec<String> {
    event.sources().iter().map(ToString::to_string).collect()
}

fn image_from_row(row: &PgRow) -> Result<PropertyImage, StoreError> {
    let id: Uuid = row.try_get("id")?;

    let status_str: String = row.try_get("enhancement_status")?;
    let status = EnhancementStatus::from_str(&status_str).map_err(|_| StoreError::Corrupt {
        id,
        reason: format!("unknown enhancement status '{status_str}'"),
    })?;

    let type_str: String = row.try_get("image_type")?;
    let image_type = ImageType::from_str(&type_str).map_err(|_| StoreError::Corrupt {
        id,
        reason: format!("unknown image type '{type_str}'"),
    })?;

    Ok(PropertyImage {
        id,
        property_id: row.try_get("property_id")?,
        original_url: row.try_get("original_url")?,
        original_key: row.try_get("original_key")?,
        enhanced_url: row.try_get("enhanced_url")?,
        enhanced_key: row.try_get("enhanced_key")?,
        image_type,
        is_primary: row.try_get("is_primary")?,
        display_order: row.try_get("display_order")?,
        status,
        job_id: row.try_get("ai_job_id")?,
        enhancement_error: row.try_get("enhancement_error")?,
        created_at: row.try_get("created_at")?,
        requested_at: row.try_get("enhancement_requested_at")?,
        resolved_at: row.try_get("enhancement_resolved_at")?,
    })
}

fn optional_image(row: Option<PgRow>) -> Result<Option<PropertyImage>, StoreError> {
    row.as_ref().map(image_from_row).transpose()
}

#[async_trait]
impl ImageStore for PgImageStore {
    async fn insert(&self, image: NewImage) -> Result<PropertyImage, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO property_images
                (property_id, original_url, original_key, image_type, is_primary,
                 display_order, enhancement_status)
            VALUES (
                $1, $2, $3, $4, $5,
                COALESCE((SELECT MAX(display_order) + 1 FROM property_images WHERE property_id = $1), 0),
                'pending'
            )
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(image.property_id)
            .bind(&image.original_url)
            .bind(&image.original_key)
            .bind(image.image_type.to_string())
            .bind(image.is_primary)
            .fetch_one(&self.pool)
            .await?;

        image_from_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PropertyImage>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM property_images WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        optional_image(row)
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<PropertyImage>, StoreError> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM property_images WHERE ai_job_id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        optional_image(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM property_images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn property_exists(&self, property_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM properties WHERE id = $1) AS present")
            .bind(property_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("present")?)
    }

    async fn begin_processing(
        &self,
        id: Uuid,
        job_id: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let sql = format!(
            r#"
            UPDATE property_images
            SET enhancement_status = 'processing',
                ai_job_id = $2,
                enhancement_requested_at = $3,
                enhancement_resolved_at = NULL,
                enhancement_error = NULL
            WHERE id = $1 AND enhancement_status = ANY($4)
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(job_id)
            .bind(requested_at)
            .bind(status_list(EnhancementEvent::Requested))
            .fetch_optional(&self.pool)
            .await?;
        optional_image(row)
    }

    async fn resolve(
        &self,
        id: Uuid,
        job_id: &str,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let target = resolution.event().target().to_string();
        let (url, key, reason) = match resolution {
            Resolution::Completed { url, key } => (Some(url), Some(key), None),
            Resolution::Failed { reason } => (None, None, Some(reason)),
        };

        let sql = format!(
            r#"
            UPDATE property_images
            SET enhancement_status = $3,
                enhanced_url = $4,
                enhanced_key = $5,
                enhancement_error = $6,
                enhancement_resolved_at = $7
            WHERE id = $1 AND ai_job_id = $2 AND enhancement_status = 'processing'
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(job_id)
            .bind(target)
            .bind(url)
            .bind(key)
            .bind(reason)
            .bind(resolved_at)
            .fetch_optional(&self.pool)
            .await?;
        optional_image(row)
    }

    async fn time_out(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<PropertyImage>, StoreError> {
        let sql = format!(
            r#"
            UPDATE property_images
            SET enhancement_status = 'timeout',
                enhancement_resolved_at = $3,
                enhancement_error = 'No callback received before timeout'
            WHERE id = $1
              AND enhancement_status = 'processing'
              AND enhancement_requested_at < $2
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .bind(cutoff)
            .bind(resolved_at)
            .fetch_optional(&self.pool)
            .await?;
        optional_image(row)
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<PropertyImage>, StoreError> {
        let sql = format!(
            r#"
            SELECT {IMAGE_COLUMNS}
            FROM property_images
            WHERE enhancement_status = 'processing'
              AND enhancement_requested_at < $1
            ORDER BY enhancement_requested_at ASC
            "#
        );

        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&self.pool).await?;
        rows.iter().map(image_from_row).collect()
    }

    async fn count_by_status(&self) -> Result<Vec<(EnhancementStatus, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT enhancement_status, COUNT(*) AS count
            FROM property_images
            GROUP BY enhancement_status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row.try_get("enhancement_status")?;
            // Unknown values are rejected by the column's CHECK constraint.
            if let Ok(status) = EnhancementStatus::from_str(&status_str) {
                counts.push((status, row.try_get("count")?));
            }
        }
        Ok(counts)
    }

    async fn active_property_counts(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT property_type, COUNT(*) AS count
            FROM properties
            WHERE is_active
            GROUP BY property_type
            ORDER BY property_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, i64), StoreError> {
                Ok((row.try_get("property_type")?, row.try_get("count")?))
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
