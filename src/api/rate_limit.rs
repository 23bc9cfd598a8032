//! In-memory token-bucket rate limiting for API endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Smallest idle time before a bucket may be evicted
const MIN_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Bucket shape: how many tokens it holds and how fast it refills
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum tokens available at once
    pub burst: u32,
    /// Tokens added per second
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    /// `n` requests per minute with a burst of `n`
    pub fn per_minute(n: u32) -> Self {
        Self {
            burst: n,
            refill_per_sec: f64::from(n) / 60.0,
        }
    }

    /// Time for an empty bucket to fill completely
    pub fn full_refill(&self) -> Duration {
        if self.refill_per_sec <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64(f64::from(self.burst) / self.refill_per_sec)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

/// Per-key token bucket
#[derive(Clone, Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: f64::from(config.burst),
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(f64::from(config.burst));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit exceeded")]
    Exceeded { key: String },
}

/// Admit-or-reject decision for a request key.
pub trait RateLimit: Send + Sync {
    /// Returns true if the request identified by `key` is allowed
    fn check(&self, key: &str) -> bool;

    /// Drop state that no longer affects decisions. Returns how many keys went.
    fn evict_idle(&self) -> usize {
        0
    }

    fn admit(&self, key: &str) -> Result<(), RateLimitError> {
        if self.check(key) {
            Ok(())
        } else {
            Err(RateLimitError::Exceeded { key: key.to_string() })
        }
    }
}

/// Thread-safe keyed rate limiter; buckets are created on first use
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    idle_ttl: Duration,
    state: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            idle_ttl: config.full_refill().max(MIN_IDLE_TTL),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(&self.config, now))
            .try_acquire(&self.config, now)
    }

    /// Remove buckets idle long enough to have refilled completely; such a
    /// bucket behaves exactly like a freshly created one.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.len();
        state.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < self.idle_ttl);
        before - state.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl RateLimit for RateLimiter {
    fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn evict_idle(&self) -> usize {
        self.cleanup_at(Instant::now())
    }
}

/// The limiter layers applied by the router
#[derive(Clone)]
pub struct RateLimits {
    /// Every throttled request, keyed by client IP
    pub global: Arc<dyn RateLimit>,
    /// `POST /survey`, keyed by client IP and route
    pub survey: Arc<dyn RateLimit>,
    /// `POST /login`, keyed by client IP and route
    pub login: Arc<dyn RateLimit>,
}

impl RateLimits {
    pub fn new(global: RateLimitConfig, survey: RateLimitConfig, login: RateLimitConfig) -> Self {
        Self {
            global: Arc::new(RateLimiter::new(global)),
            survey: Arc::new(RateLimiter::new(survey)),
            login: Arc::new(RateLimiter::new(login)),
        }
    }

    fn all(&self) -> [&Arc<dyn RateLimit>; 3] {
        [&self.global, &self.survey, &self.login]
    }

    /// Evict idle keys from every layer
    pub fn cleanup(&self) -> usize {
        self.all().iter().map(|l| l.evict_idle()).sum()
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new(
            RateLimitConfig::per_minute(60),
            RateLimitConfig::per_minute(5),
            RateLimitConfig::per_minute(3),
        )
    }
}

/// Periodically evict idle keys (runs until the runtime shuts down)
pub fn spawn_cleanup_task(limits: RateLimits, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = limits.cleanup();
            if evicted > 0 {
                debug!("🧹 Evicted {} idle rate-limit keys", evicted);
            }
        }
    })
}
