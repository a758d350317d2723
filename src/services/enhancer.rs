use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RESULT_BYTES: usize = 10 * 1024 * 1024;

/// Job submission for one stored image.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancementJob {
    pub image_url: String,
    /// Our correlation id (the image id).
    pub job_id: String,
    pub webhook_url: String,
}

/// Remote AI enhancement service. Submission is request/acknowledge only;
/// results arrive later through the webhook.
#[async_trait]
pub trait EnhancementClient: Send + Sync {
    /// Submit a job and return the remote job identifier.
    async fn submit(&self, job: &EnhancementJob) -> Result<String, EnhancerError>;

    /// Download an enhanced asset from the reference given in a callback.
    async fn fetch_result(&self, url: &str) -> Result<Vec<u8>, EnhancerError>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    ai_job_id: Option<String>,
}

/// HTTP client for the enhancement service.
pub struct AiServiceClient {
    http: Client,
    api_url: String,
    api_key: String,
    max_result_bytes: usize,
}

impl AiServiceClient {
    pub fn new(api_url: &str, api_key: &str) -> Result<Self, EnhancerError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(EnhancerError::Http)?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        })
    }

    /// Largest enhanced asset `fetch_result` will download.
    pub fn with_max_result_bytes(mut self, limit: usize) -> Self {
        self.max_result_bytes = limit;
        self
    }
}

#[async_trait]
impl EnhancementClient for AiServiceClient {
    async fn submit(&self, job: &EnhancementJob) -> Result<String, EnhancerError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(job)
            .send()
            .await
            .map_err(EnhancerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                job_id = %job.job_id,
                status_code = status.as_u16(),
                "Enhancement service rejected job"
            );
            return Err(EnhancerError::Rejected(status.as_u16()));
        }

        let body: SubmitResponse = response.json().await.map_err(EnhancerError::Http)?;
        let ai_job_id = body.ai_job_id.unwrap_or_else(|| job.job_id.clone());

        tracing::info!(job_id = %job.job_id, ai_job_id = %ai_job_id, "Enhancement job accepted");
        Ok(ai_job_id)
    }

    async fn fetch_result(&self, url: &str) -> Result<Vec<u8>, EnhancerError> {
        let mut response = self.http.get(url).send().await.map_err(EnhancerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnhancerError::Rejected(status.as_u16()));
        }

        let limit = self.max_result_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(EnhancerError::TooLarge { limit });
        }

        // Content-Length may be absent, so count while streaming too.
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(EnhancerError::Http)? {
            if bytes.len() + chunk.len() > limit {
                return Err(EnhancerError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Scripted [`EnhancementClient`] for tests and offline development.
///
/// Hands out queued job ids (or `job-<n>`), records every submission, and
/// serves enhanced assets registered with [`StubEnhancementClient::add_asset`].
#[derive(Default)]
pub struct StubEnhancementClient {
    job_ids: Mutex<VecDeque<String>>,
    submitted: Mutex<Vec<EnhancementJob>>,
    assets: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
    counter: AtomicUsize,
}

impl StubEnhancementClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_job_id(&self, job_id: &str) {
        self.job_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job_id.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn add_asset(&self, url: &str, data: &[u8]) {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), data.to_vec());
    }

    pub fn submitted(&self) -> Vec<EnhancementJob> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EnhancementClient for StubEnhancementClient {
    async fn submit(&self, job: &EnhancementJob) -> Result<String, EnhancerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EnhancerError::Unreachable("stub marked unavailable".to_string()));
        }

        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.clone());

        let queued = self
            .job_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(queued.unwrap_or_else(|| {
            format!("job-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        }))
    }

    async fn fetch_result(&self, url: &str) -> Result<Vec<u8>, EnhancerError> {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or(EnhancerError::Rejected(404))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnhancerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Enhancement service returned status {0}")]
    Rejected(u16),

    #[error("Enhancement service unreachable: {0}")]
    Unreachable(String),

    #[error("Enhanced asset exceeds {limit} bytes")]
    TooLarge { limit: usize },
}
