//! Timeout sweep for images stuck in `processing`.
//!
//! The remote service may never call back. The sweep gives up waiting after a
//! threshold and moves those images to `timeout` so operators can retry. It
//! does not cancel anything remotely; a callback arriving later is stale.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{ImageStore, StoreError};

pub const DEFAULT_TIMEOUT_HOURS: i64 = 48;

/// One record that could not be transitioned. The sweep carries on past it.
#[derive(Debug, thiserror::Error)]
#[error("Failed to time out image {image_id}: {source}")]
pub struct ReconcileRecordError {
    pub image_id: Uuid,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    /// Candidates selected by the stale query.
    pub scanned: usize,
    pub timed_out: Vec<Uuid>,
    /// Candidates whose guard no longer held (resolved concurrently).
    pub skipped: usize,
    pub failures: Vec<ReconcileRecordError>,
}

pub struct TimeoutReconciler {
    store: Arc<dyn ImageStore>,
    threshold: Duration,
}

impl TimeoutReconciler {
    pub fn new(store: Arc<dyn ImageStore>, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Sweep with the configured threshold.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        self.sweep_with_threshold(now, self.threshold).await
    }

    /// Move every `processing` image requested before `now - threshold` to `timeout`.
    ///
    /// Only a failure to list candidates aborts the pass.
    pub async fn sweep_with_threshold(
        &self,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<SweepReport, StoreError> {
        let cutoff = now - threshold;
        let stuck = self.store.list_stuck(cutoff).await?;

        let mut report = SweepReport {
            scanned: stuck.len(),
            ..SweepReport::default()
        };

        for image in stuck {
            match self.store.time_out(image.id, cutoff, now).await {
                Ok(Some(_)) => report.timed_out.push(image.id),
                Ok(None) => report.skipped += 1,
                Err(source) => {
                    let error = ReconcileRecordError {
                        image_id: image.id,
                        source,
                    };
                    tracing::error!(image_id = %image.id, error = %error, "Skipping image in timeout sweep");
                    report.failures.push(error);
                }
            }
        }

        if !report.timed_out.is_empty() {
            metrics::counter!("image_enhancement_status_total", "status" => "timeout")
                .increment(report.timed_out.len() as u64);
            tracing::warn!(
                count = report.timed_out.len(),
                image_ids = ?report.timed_out,
                "Stuck images marked as timeout"
            );
        }

        tracing::info!(
            scanned = report.scanned,
            timed_out = report.timed_out.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "Timeout sweep complete"
        );

        Ok(report)
    }
}
