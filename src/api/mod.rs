//! HTTP API for the survey service.
//! Public endpoints accept submissions and logins; admin endpoints read,
//! summarise and delete results behind a bearer token.

pub mod client_ip;
pub mod error;
pub mod middleware;
pub mod rate_limit;

use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path, State},
    http::{header::HOST, HeaderMap, StatusCode},
    middleware::{from_fn_with_state, map_response},
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{AuthGate, AuthenticatedUser};
use crate::survey::SurveyService;
use crate::types::{LoginRequest, SurveyMetrics, SurveyResponse, SurveySubmission};
use client_ip::TrustedProxies;
use error::ApiError;
use middleware::{global_limit, mark_preview, require_auth, route_limit, LimiterState};
use rate_limit::RateLimits;

/// Services shared by every handler
pub struct AppContext {
    pub surveys: SurveyService,
    pub auth: AuthGate,
}

impl AppContext {
    pub fn new(surveys: SurveyService, auth: AuthGate) -> Self {
        Self { surveys, auth }
    }
}

/// Shared application state
pub type AppState = Arc<AppContext>;

/// Body of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { success: false, error: msg.into() }
    }
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
    username: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    host: String,
}

/// Create the API router. `None` limits means rate limiting is disabled.
pub fn create_router(
    state: AppState,
    limits: Option<RateLimits>,
    proxies: TrustedProxies,
) -> Router {
    let proxies = Arc::new(proxies);

    let mut survey_route = post(submit_survey);
    let mut login_route = post(login);
    if let Some(limits) = &limits {
        survey_route = survey_route.route_layer(from_fn_with_state(
            LimiterState::new(limits.survey.clone(), proxies.clone()),
            route_limit,
        ));
        login_route = login_route.route_layer(from_fn_with_state(
            LimiterState::new(limits.login.clone(), proxies.clone()),
            route_limit,
        ));
    }

    let protected = Router::new()
        .route("/results", get(list_results))
        .route("/results/:id", delete(delete_result))
        .route("/metrics", get(get_metrics))
        .route("/verify", get(verify_token))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let mut throttled = Router::new()
        .route("/survey", survey_route)
        .route("/login", login_route)
        .merge(protected);

    if let Some(limits) = &limits {
        throttled = throttled.layer(from_fn_with_state(
            LimiterState::new(limits.global.clone(), proxies.clone()),
            global_limit,
        ));
    }

    let router = Router::new()
        // Health check stays outside every limiter
        .route("/health", get(health_check))
        .merge(throttled)
        // The survey form is served from a different origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let router = match limits {
        Some(_) => router,
        None => router.layer(map_response(mark_preview)),
    };

    router.with_state(state)
}

/// Health check endpoint
async fn health_check(headers: HeaderMap) -> Json<HealthResponse> {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    debug!("Health check from host '{}'", host);

    Json(HealthResponse { status: "healthy", host })
}

/// Submit a survey response
async fn submit_survey(
    State(state): State<AppState>,
    payload: Result<Json<SurveySubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SurveyResponse>), ApiError> {
    let Json(submission) = payload?;
    let response = state.surveys.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Exchange admin credentials for a token
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!("Malformed login body: {}", rejection.body_text());
        ApiError::BadRequest("invalid request format".to_string())
    })?;

    let token = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(TokenResponse { token }))
}

/// All stored responses
async fn list_results(
    State(state): State<AppState>,
) -> Result<Json<Arc<Vec<SurveyResponse>>>, ApiError> {
    Ok(Json(state.surveys.list().await?))
}

async fn get_metrics(State(state): State<AppState>) -> Result<Json<SurveyMetrics>, ApiError> {
    Ok(Json(state.surveys.metrics().await?))
}

/// Delete one response; unknown ids succeed too
async fn delete_result(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.surveys.delete(&id).await?;
    info!("🗑️ Result {} deleted by '{}'", id, user.username);
    Ok(Json(MessageResponse { message: "Result deleted" }))
}

async fn verify_token(Extension(user): Extension<AuthenticatedUser>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        username: user.username,
    })
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("🛑 Shutdown signal received");
}

/// Start the API server
pub async fn start_server(
    state: AppState,
    limits: Option<RateLimits>,
    proxies: TrustedProxies,
    addr: &str,
) -> anyhow::Result<()> {
    let router = create_router(state, limits, proxies);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🌐 API server listening on {}", addr);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
