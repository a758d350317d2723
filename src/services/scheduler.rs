//! Periodic task loop run by the worker binary.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::db::store::ImageStore;
use crate::services::analytics;
use crate::services::reconciler::TimeoutReconciler;

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub sweep_every: Duration,
    pub analytics_every: Duration,
}

/// Passes completed before shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub sweeps: u64,
    pub aggregations: u64,
}

/// Run the timeout sweep and analytics aggregation until `shutdown` resolves.
///
/// `shutdown` is polled for the whole run, so a signal raised while a pass is
/// in progress stops the loop as soon as that pass returns. A failed pass is
/// logged and retried on the next tick.
pub async fn run<F>(
    reconciler: &TimeoutReconciler,
    store: &Arc<dyn ImageStore>,
    schedule: Schedule,
    shutdown: F,
) -> RunSummary
where
    F: Future,
{
    let mut sweep_tick = interval(schedule.sweep_every);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut analytics_tick = interval(schedule.analytics_every);
    analytics_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);
    let mut summary = RunSummary::default();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(
                    sweeps = summary.sweeps,
                    aggregations = summary.aggregations,
                    "Shutdown signal received, stopping worker"
                );
                return summary;
            }
            _ = sweep_tick.tick() => {
                if let Err(e) = reconciler.sweep(Utc::now()).await {
                    tracing::error!(error = %e, "Timeout sweep failed");
                }
                summary.sweeps += 1;
            }
            _ = analytics_tick.tick() => {
                if let Err(e) = analytics::aggregate(store).await {
                    tracing::error!(error = %e, "Analytics aggregation failed");
                }
                summary.aggregations += 1;
            }
        }
    }
}
