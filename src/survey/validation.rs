//! Submission rules checked before anything is written.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::types::SurveySubmission;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("role is required")]
    MissingRole,
    #[error("CMS usage is required")]
    MissingCmsUsage,
    #[error("valid email is required for beta program")]
    InvalidBetaEmail,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Required fields, then the beta-interest email rule
pub fn validate_submission(submission: &SurveySubmission) -> Result<(), ValidationError> {
    if submission.role.is_empty() {
        return Err(ValidationError::MissingRole);
    }
    if submission.cms_usage.is_empty() {
        return Err(ValidationError::MissingCmsUsage);
    }
    if submission.beta_interest {
        match submission.email.as_deref() {
            Some(email) if is_valid_email(email) => {}
            _ => return Err(ValidationError::InvalidBetaEmail),
        }
    }
    Ok(())
}
