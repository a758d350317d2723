//! Fixed-window request counters shared across server instances.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const KEY_PREFIX: &str = "casabricks:rate_limit";

/// Counter service backing the rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, expiring it after `ttl`, and return the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError>;

    async fn ping(&self) -> Result<(), RateLimitError>;
}

/// Redis counters: an atomic `INCR` + `EXPIRE` pipeline per request.
pub struct RedisCounterStore {
    client: redis::Client,
}

impl RedisCounterStore {
    pub fn new(redis_url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(redis_url).map_err(RateLimitError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(RateLimitError::Redis)?;
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(RateLimitError::Redis)?;
        Ok(count)
    }

    async fn ping(&self) -> Result<(), RateLimitError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(RateLimitError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(RateLimitError::Redis)?;
        Ok(())
    }
}

/// In-process counters for tests and single-instance development.
///
/// Keys expire after their `ttl` like the Redis store's, so counters from
/// earlier windows are dropped on the next increment.
#[derive(Default)]
pub struct MemoryCounterStore {
    counts: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        let now = Instant::now();
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.retain(|_, (_, expires_at)| *expires_at > now);

        let (count, _) = counts
            .entry(key.to_string())
            .or_insert_with(|| (0, now + ttl));
        *count += 1;
        Ok(*count)
    }

    async fn ping(&self) -> Result<(), RateLimitError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    Allowed { limit: u64, remaining: u64 },
    Limited { limit: u64, retry_after_secs: u64 },
}

/// Per-client limit over one-minute windows.
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    limit: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, limit_per_minute: u64) -> Self {
        Self {
            counters,
            limit: limit_per_minute,
            window: Duration::from_secs(60),
        }
    }

    pub fn counters(&self) -> &Arc<dyn CounterStore> {
        &self.counters
    }

    /// Count one request from `client` at `now`.
    pub async fn check_at(
        &self,
        client: &str,
        now: SystemTime,
    ) -> Result<RateDecision, RateLimitError> {
        let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let window_secs = self.window.as_secs();
        let window_start = elapsed - elapsed % window_secs;
        let key = format!("{KEY_PREFIX}:{client}:{window_start}");

        let count = self.counters.increment(&key, self.window).await?;
        if count > self.limit {
            return Ok(RateDecision::Limited {
                limit: self.limit,
                retry_after_secs: (window_start + window_secs).saturating_sub(elapsed).max(1),
            });
        }
        Ok(RateDecision::Allowed {
            limit: self.limit,
            remaining: self.limit - count,
        })
    }

    pub async fn check(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        self.check_at(client, SystemTime::now()).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
