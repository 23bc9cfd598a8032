use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use haven_survey::api::client_ip::{TrustedProxies, DEFAULT_TRUSTED_PROXIES};
use haven_survey::api::rate_limit::{RateLimitConfig, RateLimits};
use haven_survey::api::{create_router, AppContext};
use haven_survey::auth::AuthGate;
use haven_survey::cache::ResultsCache;
use haven_survey::storage::Storage;
use haven_survey::survey::SurveyService;

const FAILURE_DELAY: Duration = Duration::from_millis(100);

fn app(limits: Option<RateLimits>) -> Router {
    app_behind(limits, TrustedProxies::default())
}

fn app_behind(limits: Option<RateLimits>, proxies: TrustedProxies) -> Router {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    // Zero TTL keeps listings straight from storage
    let surveys = SurveyService::new(storage, ResultsCache::new(Duration::ZERO));
    let auth = AuthGate::new("admin", "hunter2", "integration-secret")
        .with_failure_delay(FAILURE_DELAY);
    create_router(Arc::new(AppContext::new(surveys, auth)), limits, proxies)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/login",
            json!({"username": "admin", "password": "hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn survey(role: &str) -> Value {
    json!({
        "role": role,
        "cmsUsage": "daily",
        "betaInterest": true,
        "email": "a@b.com",
        "features": {
            "offline": 3,
            "collaboration": 4,
            "assetManagement": 2,
            "pdfHandling": 5,
            "versionControl": 1,
            "workflows": 4
        },
        "teamSize": "2-5"
    })
}

#[tokio::test]
async fn test_submit_then_list_round_trip() {
    let app = app(None);

    let (status, stored) = send(&app, json_request(Method::POST, "/survey", survey("Editor"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(stored["id"].is_string());
    assert!(stored["createdAt"].is_string());

    let token = login(&app).await;
    let (status, listed) = send(&app, authed(Method::GET, "/results", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], stored["id"]);
    assert_eq!(listed[0]["role"], "Editor");
    assert_eq!(listed[0]["email"], "a@b.com");
    assert_eq!(listed[0]["teamSize"], "2-5");
    assert_eq!(listed[0]["features"], survey("Editor")["features"]);
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let app = app(None);

    let mut body = survey("");
    let (status, error) = send(&app, json_request(Method::POST, "/survey", body.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error, json!({"success": false, "error": "role is required"}));

    body["role"] = json!("Editor");
    body["email"] = json!("not-an-email");
    let (status, error) = send(&app, json_request(Method::POST, "/survey", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "valid email is required for beta program");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = app(None);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/survey")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_and_verify() {
    let app = app(None);
    let token = login(&app).await;

    let (status, body) = send(&app, authed(Method::GET, "/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": true, "username": "admin"}));
}

#[tokio::test]
async fn test_wrong_password_is_delayed_401() {
    let app = app(None);
    let started = Instant::now();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/login",
            json!({"username": "admin", "password": "wrong"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");
    assert!(started.elapsed() >= FAILURE_DELAY);
}

#[tokio::test]
async fn test_malformed_login_body_is_400() {
    let app = app(None);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"username\":"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid request format");
}

#[tokio::test]
async fn test_incomplete_credentials_are_delayed_401() {
    let app = app(None);
    let started = Instant::now();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/login", json!({"username": "admin"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");
    assert!(started.elapsed() >= FAILURE_DELAY);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = app(None);

    for (method, uri) in [
        (Method::GET, "/results"),
        (Method::GET, "/metrics"),
        (Method::GET, "/verify"),
        (Method::DELETE, "/results/abc"),
    ] {
        let request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body["error"], "authorization header required");

        let (status, body) = send(&app, authed(method.clone(), uri, "not.a.token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body["error"], "invalid token");
    }
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = app(None);
    let token = login(&app).await;

    let (_, stored) = send(&app, json_request(Method::POST, "/survey", survey("Editor"))).await;
    let uri = format!("/results/{}", stored["id"].as_str().unwrap());

    for _ in 0..2 {
        let (status, body) = send(&app, authed(Method::DELETE, &uri, &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Result deleted"}));
    }

    let (status, _) = send(&app, authed(Method::DELETE, "/results/never-existed", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&app, authed(Method::GET, "/results", &token)).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn test_metrics_on_empty_table() {
    let app = app(None);
    let token = login(&app).await;

    let (status, metrics) = send(&app, authed(Method::GET, "/metrics", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["totalResponses"], 0);
    assert_eq!(metrics["betaInterestCount"], 0);
    assert_eq!(metrics["averageFeatureScores"]["offline"], 0.0);
    assert_eq!(metrics["teamSizeDistribution"], json!({}));
}

#[tokio::test]
async fn test_concurrent_submissions_both_persist() {
    let app = app(None);
    let token = login(&app).await;

    let (first, second) = tokio::join!(
        send(&app, json_request(Method::POST, "/survey", survey("Editor"))),
        send(&app, json_request(Method::POST, "/survey", survey("Developer"))),
    );
    assert_eq!(first.0, StatusCode::CREATED);
    assert_eq!(second.0, StatusCode::CREATED);

    let (_, listed) = send(&app, authed(Method::GET, "/results", &token)).await;
    let mut roles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["role"].as_str().unwrap())
        .collect();
    roles.sort();
    assert_eq!(roles, ["Developer", "Editor"]);

    let (_, metrics) = send(&app, authed(Method::GET, "/metrics", &token)).await;
    assert_eq!(metrics["totalResponses"], 2);
    assert_eq!(metrics["betaInterestCount"], 2);
    assert_eq!(metrics["teamSizeDistribution"], json!({"2-5": 2}));
}

#[tokio::test]
async fn test_survey_route_limit() {
    let app = app(Some(RateLimits::default()));

    for _ in 0..5 {
        let (status, _) = send(&app, json_request(Method::POST, "/survey", survey("Editor"))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, json_request(Method::POST, "/survey", survey("Editor"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"success": false, "error": "rate limit exceeded"}));

    // Other routes keep their own budget
    let token = login(&app).await;
    let (status, _) = send(&app, authed(Method::GET, "/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_route_limit() {
    let app = app(Some(RateLimits::default()));
    let wrong = json!({"username": "admin", "password": "wrong"});

    for _ in 0..3 {
        let (status, _) = send(&app, json_request(Method::POST, "/login", wrong.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let good = json!({"username": "admin", "password": "hunter2"});
    let (status, body) = send(&app, json_request(Method::POST, "/login", good)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");

    // Survey submissions from the same client have their own budget
    let (status, _) = send(&app, json_request(Method::POST, "/survey", survey("Editor"))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_forged_forwarding_entries_share_one_budget() {
    let proxies = TrustedProxies::parse_list(&DEFAULT_TRUSTED_PROXIES.join(",")).unwrap();
    let app = app_behind(Some(RateLimits::default()), proxies);
    let proxy: SocketAddr = "172.18.0.2:41000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..8 {
        let mut request = json_request(Method::POST, "/survey", survey("Editor"));
        request.headers_mut().insert(
            "x-forwarded-for",
            format!("6.6.6.{i}, 203.0.113.9").parse().unwrap(),
        );
        request.extensions_mut().insert(ConnectInfo(proxy));
        statuses.push(send(&app, request).await.0);
    }

    assert_eq!(statuses[..5], [StatusCode::CREATED; 5]);
    assert_eq!(statuses[5..], [StatusCode::TOO_MANY_REQUESTS; 3]);

    // A different real client behind the same proxy is unaffected
    let mut request = json_request(Method::POST, "/survey", survey("Editor"));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.10".parse().unwrap());
    request.extensions_mut().insert(ConnectInfo(proxy));
    assert_eq!(send(&app, request).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_is_never_throttled() {
    let tight = RateLimitConfig::per_minute(1);
    let app = app(Some(RateLimits::new(tight, tight, tight)));

    let (status, _) = send(&app, authed(Method::GET, "/verify", "x")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, authed(Method::GET, "/verify", "x")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..5 {
        let request = Request::builder()
            .uri("/health")
            .header(header::HOST, "survey.example.com")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy", "host": "survey.example.com"}));
    }
}

#[tokio::test]
async fn test_disabled_limits_mark_preview() {
    let app = app(None);

    for _ in 0..8 {
        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/survey", survey("Editor")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-environment"], "preview");
    }
}
