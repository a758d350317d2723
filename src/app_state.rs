use std::sync::Arc;

use crate::db::store::ImageStore;
use crate::services::{
    auth::JwtKeys,
    enhancement::EnhancementService,
    rate_limit::RateLimiter,
    storage::ObjectStore,
};

/// Upload limits applied by the image routes.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<dyn ImageStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub enhancement: Arc<EnhancementService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub jwt: Arc<JwtKeys>,
    pub uploads: UploadPolicy,
}

impl AppState {
    pub fn new(
        images: Arc<dyn ImageStore>,
        storage: Arc<dyn ObjectStore>,
        enhancement: EnhancementService,
        rate_limiter: RateLimiter,
        jwt: JwtKeys,
        uploads: UploadPolicy,
    ) -> Self {
        Self {
            images,
            storage,
            enhancement: Arc::new(enhancement),
            rate_limiter: Arc::new(rate_limiter),
            jwt: Arc::new(jwt),
            uploads,
        }
    }
}
