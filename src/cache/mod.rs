//! Short-lived cache of the full result set.
//!
//! A single slot holds the last full listing and when it was captured. The
//! slot is considered fresh while younger than the TTL and non-empty. Writes
//! and deletes never touch it, so a warm cache can lag behind storage by up to
//! one TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::types::SurveyResponse;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedResults {
    responses: Arc<Vec<SurveyResponse>>,
    captured_at: Instant,
}

/// Thread-safe single-slot cache; readers share the lock while it is fresh
pub struct ResultsCache {
    ttl: Duration,
    slot: RwLock<Option<CachedResults>>,
}

impl ResultsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached listing, if present and fresh
    pub async fn get(&self) -> Option<Arc<Vec<SurveyResponse>>> {
        self.get_at(Instant::now()).await
    }

    pub async fn get_at(&self, now: Instant) -> Option<Arc<Vec<SurveyResponse>>> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|c| !c.responses.is_empty())
            .filter(|c| now.saturating_duration_since(c.captured_at) < self.ttl)
            .map(|c| c.responses.clone())
    }

    /// Replace the slot with a fresh listing
    pub async fn store(&self, responses: Vec<SurveyResponse>) -> Arc<Vec<SurveyResponse>> {
        self.store_at(responses, Instant::now()).await
    }

    pub async fn store_at(
        &self,
        responses: Vec<SurveyResponse>,
        now: Instant,
    ) -> Arc<Vec<SurveyResponse>> {
        let responses = Arc::new(responses);
        let mut slot = self.slot.write().await;
        *slot = Some(CachedResults {
            responses: responses.clone(),
            captured_at: now,
        });
        responses
    }
}

impl Default for ResultsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
