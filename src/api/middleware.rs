//! Request guards run before handlers: throttling and bearer-token checks.

use axum::extract::{MatchedPath, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use super::client_ip::{client_key, TrustedProxies};
use super::error::ApiError;
use super::rate_limit::RateLimit;
use super::AppState;

/// One limiter plus the proxy list needed to key it
#[derive(Clone)]
pub struct LimiterState {
    limiter: Arc<dyn RateLimit>,
    proxies: Arc<TrustedProxies>,
}

impl LimiterState {
    pub fn new(limiter: Arc<dyn RateLimit>, proxies: Arc<TrustedProxies>) -> Self {
        Self { limiter, proxies }
    }
}

/// Throttle every request by client IP
pub async fn global_limit(
    State(guard): State<LimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&request, &guard.proxies);
    guard.limiter.admit(&key)?;
    Ok(next.run(request).await)
}

/// Throttle by client IP and matched route template
pub async fn route_limit(
    State(guard): State<LimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!("{}:{}", client_key(&request, &guard.proxies), route);

    guard.limiter.admit(&key)?;
    Ok(next.run(request).await)
}

/// Reject requests without a valid token; admitted requests carry the
/// `AuthenticatedUser` extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let user = state.auth.authenticate(header)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Tag responses from a deployment running without rate limits
pub async fn mark_preview(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert("x-environment", HeaderValue::from_static("preview"));
    response
}
