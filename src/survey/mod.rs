//! Survey repository: validation, persistence and aggregate queries.

pub mod validation;

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cache::ResultsCache;
use crate::storage::{Storage, StorageError};
use crate::types::{SurveyMetrics, SurveyResponse, SurveySubmission};
pub use validation::{validate_submission, ValidationError};

#[derive(Error, Debug)]
pub enum SurveyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Accepts submissions and serves listings, deletes and metrics.
///
/// SQLite calls are synchronous, so each one runs on the blocking pool
/// rather than on a runtime worker.
pub struct SurveyService {
    storage: Arc<Storage>,
    cache: ResultsCache,
}

impl SurveyService {
    pub fn new(storage: Arc<Storage>, cache: ResultsCache) -> Self {
        Self { storage, cache }
    }

    async fn with_storage<T, F>(&self, op: F) -> Result<T, SurveyError>
    where
        F: FnOnce(&Storage) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.storage.clone();
        Ok(tokio::task::spawn_blocking(move || op(&storage)).await??)
    }

    /// Validate, assign id and timestamp, and persist one submission
    pub async fn submit(&self, submission: SurveySubmission) -> Result<SurveyResponse, SurveyError> {
        validate_submission(&submission)?;

        let response = SurveyResponse {
            id: Uuid::new_v4().to_string(),
            submission,
            created_at: Utc::now(),
        };
        let response = self
            .with_storage(move |storage| storage.save_response(&response).map(|_| response))
            .await?;

        debug!(
            "📝 Stored survey {} (role: {})",
            response.id, response.submission.role
        );
        Ok(response)
    }

    /// Every stored response, served from the cache while it is fresh
    pub async fn list(&self) -> Result<Arc<Vec<SurveyResponse>>, SurveyError> {
        if let Some(cached) = self.cache.get().await {
            debug!("Serving {} results from cache", cached.len());
            return Ok(cached);
        }

        let responses = self.with_storage(Storage::load_all_responses).await?;
        debug!("Loaded {} results from storage", responses.len());
        Ok(self.cache.store(responses).await)
    }

    /// Remove a response. Unknown ids are not an error.
    pub async fn delete(&self, id: &str) -> Result<(), SurveyError> {
        let key = id.to_string();
        let removed = self.with_storage(move |storage| storage.delete_response(&key)).await?;
        if removed == 0 {
            debug!("Delete of {} matched no rows", id);
        }
        Ok(())
    }

    pub async fn metrics(&self) -> Result<SurveyMetrics, SurveyError> {
        self.with_storage(Storage::compute_metrics).await
    }
}
