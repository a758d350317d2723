use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Externally reachable base URL of this API, used to build webhook callback URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for rate limit counters
    pub redis_url: String,

    /// Enhancement service endpoint that accepts jobs
    pub ai_service_api_url: String,

    /// Bearer token for the enhancement service
    pub ai_service_api_key: String,

    /// Shared secret for webhook HMAC signatures
    pub ai_service_webhook_secret: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL objects are served from (e.g., an R2 custom domain)
    pub r2_public_url: String,

    /// HS256 secret for operator tokens
    pub jwt_secret_key: String,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: usize,

    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u64,

    /// Comma-separated CORS origins; empty means permissive.
    #[serde(default)]
    pub allowed_origins: String,

    /// Processing entries older than this are forced to `timeout`.
    #[serde(default = "default_enhancement_timeout_hours")]
    pub enhancement_timeout_hours: i64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_analytics_interval_secs")]
    pub analytics_interval_secs: u64,

    /// Prometheus listener for the background worker.
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: SocketAddr,
}

fn default_worker_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9100))
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_max_file_size_mb() -> usize {
    10
}

fn default_rate_limit_per_minute() -> u64 {
    60
}

fn default_enhancement_timeout_hours() -> i64 {
    48
}

fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

fn default_analytics_interval_secs() -> u64 {
    60 * 60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn webhook_url(&self) -> String {
        format!(
            "{}/api/v1/webhooks/ai-enhancement",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn enhancement_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.enhancement_timeout_hours)
    }

    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
