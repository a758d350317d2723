use casabricks::{
    config::AppConfig,
    db::{self, ImageStore, PgImageStore},
    routes::metrics::describe_metrics,
    services::{
        reconciler::TimeoutReconciler,
        scheduler::{self, Schedule},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting casabricks background worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    PrometheusBuilder::new()
        .with_http_listener(config.worker_metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    describe_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let store: Arc<dyn ImageStore> = Arc::new(PgImageStore::new(db_pool));

    let reconciler = TimeoutReconciler::new(store.clone(), config.enhancement_timeout());
    let schedule = Schedule {
        sweep_every: Duration::from_secs(config.sweep_interval_secs),
        analytics_every: Duration::from_secs(config.analytics_interval_secs),
    };

    tracing::info!(
        sweep_interval_secs = config.sweep_interval_secs,
        analytics_interval_secs = config.analytics_interval_secs,
        timeout_hours = reconciler.threshold().num_hours(),
        "Worker ready"
    );

    scheduler::run(&reconciler, &store, schedule, tokio::signal::ctrl_c()).await;
}
