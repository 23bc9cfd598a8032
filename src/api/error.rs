//! Mapping of module errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::rate_limit::RateLimitError;
use super::ErrorResponse;
use crate::auth::AuthError;
use crate::survey::SurveyError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the caller. Token failures collapse to one
    /// generic message; the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(AuthError::InvalidCredentials) => "invalid credentials".to_string(),
            Self::Unauthorized(AuthError::MissingToken) => {
                "authorization header required".to_string()
            }
            Self::Unauthorized(_) => "invalid token".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<SurveyError> for ApiError {
    fn from(e: SurveyError) -> Self {
        match e {
            SurveyError::Validation(v) => Self::Validation(v.to_string()),
            SurveyError::Storage(s) => Self::Storage(s.to_string()),
            SurveyError::Task(t) => Self::Storage(t.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Storage(msg) => error!("❌ Storage failure: {}", msg),
            Self::Unauthorized(e) => debug!("Rejected request: {}", e),
            Self::RateLimited(RateLimitError::Exceeded { key }) => {
                warn!("⏳ Rate limit exceeded for {}", key)
            }
            _ => {}
        }

        let status = self.status();
        (status, Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}
