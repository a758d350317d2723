use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

use casabricks::app_state::{AppState, UploadPolicy};
use casabricks::config::AppConfig;
use casabricks::db::{self, ImageStore, PgImageStore};
use casabricks::routes;
use casabricks::services::{
    auth::JwtKeys,
    enhancement::EnhancementService,
    enhancer::AiServiceClient,
    rate_limit::{RateLimiter, RedisCounterStore},
    signature::WebhookVerifier,
    storage::{ObjectStore, R2Client},
};

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins_list()
        .into_iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing casabricks API server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");
    let images: Arc<dyn ImageStore> = Arc::new(PgImageStore::new(db_pool));

    tracing::info!("Initializing R2 storage client");
    let storage: Arc<dyn ObjectStore> = Arc::new(
        R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
            &config.r2_public_url,
        )
        .expect("Failed to initialize R2 client"),
    );

    let enhancer = AiServiceClient::new(&config.ai_service_api_url, &config.ai_service_api_key)
        .expect("Failed to initialize AI enhancement client")
        .with_max_result_bytes(config.max_file_size_mb * 1024 * 1024);
    let verifier = WebhookVerifier::new(&config.ai_service_webhook_secret)
        .expect("AI_SERVICE_WEBHOOK_SECRET must not be empty");
    let enhancement = EnhancementService::new(
        images.clone(),
        Arc::new(enhancer),
        storage.clone(),
        verifier,
        config.webhook_url(),
    );

    tracing::info!("Connecting to Redis rate-limit store");
    let counters =
        RedisCounterStore::new(&config.redis_url).expect("Failed to initialize Redis client");
    let rate_limiter = RateLimiter::new(Arc::new(counters), config.rate_limit_per_minute);

    let uploads = UploadPolicy {
        max_file_size_bytes: config.max_file_size_mb * 1024 * 1024,
    };
    let body_limit = uploads.max_file_size_bytes + 1024 * 1024;

    let state = AppState::new(
        images,
        storage,
        enhancement,
        rate_limiter,
        JwtKeys::new(&config.jwt_secret_key),
        uploads,
    );

    let app = Router::new()
        .merge(routes::router(state))
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config))
        .layer(RequestBodyLimitLayer::new(body_limit));

    tracing::info!(
        webhook_url = %config.webhook_url(),
        rate_limit_per_minute = config.rate_limit_per_minute,
        "Starting casabricks on {}",
        config.bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
