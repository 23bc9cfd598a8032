//! Admin authentication with HMAC-signed bearer tokens.
//!
//! The gate is stateless: a token carries the username, issue time and
//! expiry, and every protected request is checked on its own.

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::{digest_sha256, secrets_match};

pub const TOKEN_LIFETIME_HOURS: i64 = 24;
pub const DEFAULT_FAILURE_DELAY: Duration = Duration::from_secs(1);

/// Algorithms a token may claim; everything else is refused before the
/// signature is checked.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authorization header required")]
    MissingToken,
    #[error("unexpected signing method: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity attached to a request once its token verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Issues and checks admin tokens against one configured credential pair
pub struct AuthGate {
    username_digest: [u8; 32],
    password_digest: [u8; 32],
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    failure_delay: Duration,
}

impl AuthGate {
    pub fn new(admin_username: &str, admin_password: &str, secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.set_required_spec_claims(&["exp", "iat"]);
        validation.leeway = 0;

        Self {
            username_digest: digest_sha256(admin_username.as_bytes()),
            password_digest: digest_sha256(admin_password.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            failure_delay: DEFAULT_FAILURE_DELAY,
        }
    }

    /// Delay applied before answering a failed login
    pub fn with_failure_delay(mut self, delay: Duration) -> Self {
        self.failure_delay = delay;
        self
    }

    /// Exact match on both fields; both are always compared.
    pub fn credentials_match(&self, username: &str, password: &str) -> bool {
        let user_ok = secrets_match(&self.username_digest, username);
        let pass_ok = secrets_match(&self.password_digest, password);
        user_ok & pass_ok
    }

    /// Check credentials and issue a token. Failures wait out the
    /// configured delay before returning.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if !self.credentials_match(username, password) {
            warn!("🔒 Failed login attempt for user '{}'", username);
            tokio::time::sleep(self.failure_delay).await;
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(username)?;
        info!("🔑 Issued token for '{}'", username);
        Ok(token)
    }

    pub fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(AuthError::Signing)
    }

    /// Check algorithm, signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(AuthError::InvalidToken)?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e),
            }
        })?;

        debug!("Token verified for '{}'", data.claims.username);
        Ok(data.claims)
    }

    /// Verify the value of an `Authorization` header; a `Bearer ` prefix is optional
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthenticatedUser, AuthError> {
        let raw = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(AuthError::MissingToken)?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        let claims = self.verify(token)?;
        Ok(AuthenticatedUser {
            username: claims.username,
        })
    }
}
