pub mod analytics;
pub mod auth;
pub mod enhancement;
pub mod enhancer;
pub mod rate_limit;
pub mod reconciler;
pub mod scheduler;
pub mod signature;
pub mod storage;
