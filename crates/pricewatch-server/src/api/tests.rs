use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use pricewatch_core::JobRegistry;
use pricewatch_db::{RpcJobLock, StoreClient};
use pricewatch_jobs::{CircuitBreakerRegistry, CircuitDefaults, JobDeps, Orchestrator};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn open_auth() -> AuthState {
    AuthState::from_keys("", true).expect("auth")
}

fn roomy_rate_limit() -> RateLimitState {
    RateLimitState::new(100, Duration::from_secs(60))
}

fn app_for(server: &MockServer, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let store = StoreClient::new(&server.uri(), "service-key", 5).expect("client");
    let orchestrator = Orchestrator::new(
        Arc::new(JobRegistry::builtin()),
        Arc::new(CircuitBreakerRegistry::new(CircuitDefaults::default())),
        Arc::new(RpcJobLock::new(store.clone())),
        Arc::new(JobDeps::new(store.clone())),
    );
    build_app(AppState { orchestrator, store }, auth, rate_limit)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json parse")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn mount_store_ping(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("upstream_unavailable", StatusCode::BAD_GATEWAY),
        ("anything_else", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "msg").into_response();
        assert_eq!(response.status(), status, "code {code}");
    }
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None, 20), 20);
    assert_eq!(normalize_limit(Some(0), 20), 1);
    assert_eq!(normalize_limit(Some(5_000), 20), 1_000);
}

#[tokio::test]
async fn health_reports_ok_and_echoes_request_id() {
    let server = MockServer::start().await;
    mount_store_ping(&server, 200).await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/cron/health")
                .header("x-request-id", "req-health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-health")
    );
    assert_eq!(body_json(response).await, json!({"status": "ok", "db": "ok"}));
}

#[tokio::test]
async fn health_degrades_when_store_is_down() {
    let server = MockServer::start().await;
    mount_store_ping(&server, 503).await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(get("/api/v1/cron/health"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({"status": "degraded", "db": "unavailable"})
    );
}

#[tokio::test]
async fn execute_without_job_id_is_bad_request_with_run_id() {
    let server = MockServer::start().await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(post_json("/api/v1/cron/execute", &json!({})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["jobId"].is_null());
    assert!(json["runId"].as_str().is_some_and(|id| id.starts_with("run_")));
    assert_eq!(json["error"], "jobId is required");
}

#[tokio::test]
async fn execute_unknown_job_is_not_found() {
    let server = MockServer::start().await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(post_json("/api/v1/cron/execute", &json!({"jobId": "nope"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["jobId"], "nope");
    assert_eq!(json["error"], "Job not found: nope");
    assert!(json["runId"].is_string());
}

#[tokio::test]
async fn execute_accepts_job_id_in_query_and_runs_the_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/acquire_job_lock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_job_lock"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    for table in [
        "cron_jobs_execution_log",
        "cron_jobs_metrics",
        "alertas_cambios_precios",
    ] {
        Mock::given(method("DELETE"))
            .and(path(format!("/rest/v1/{table}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;
    }
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cron/execute?jobId=maintenance_cleanup")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["jobId"], "maintenance_cleanup");
    assert_eq!(json["result"]["productsProcessed"], 3);
    assert_eq!(json["result"]["metrics"]["logs_deleted"], 1);
}

#[tokio::test]
async fn failed_run_reports_run_and_execution_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/acquire_job_lock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/release_job_lock"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/scraper-maxiconsumo/scrape"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(post_json(
            "/api/v1/cron/execute",
            &json!({"jobId": "daily_price_update"}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["runId"].as_str().is_some_and(|id| id.starts_with("run_")));
    assert!(json["executionId"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(json["result"]["success"], false);
    assert!(json["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("Scraper failed")));
}

#[tokio::test]
async fn execute_with_malformed_body_is_bad_request() {
    let server = MockServer::start().await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cron/execute")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("invalid request body")));
}

#[tokio::test]
async fn jobs_lists_the_registry() {
    let server = MockServer::start().await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(get("/api/v1/cron/jobs"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let jobs = json["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 4);
    assert!(jobs.iter().any(|j| j["jobId"] == "realtime_change_alerts"));
}

#[tokio::test]
async fn status_reports_circuits_and_recent_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 3,
            "job_id": "daily_price_update",
            "start_time": "2026-01-05T02:00:00Z",
            "end_time": "2026-01-05T02:00:04Z",
            "duracion_ms": 4000,
            "estado": "exitoso"
        }])))
        .mount(&server)
        .await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(get("/api/v1/cron/status?limit=5"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["jobs"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["jobs"][0]["circuit_state"], "closed");
    assert_eq!(json["recent_executions"][0]["duracion_ms"], 4000);
}

#[tokio::test]
async fn metrics_reports_exact_counts_and_sampled_average() {
    let server = MockServer::start().await;
    for (estado, total) in [("exitoso", 900), ("fallido", 80), ("parcial", 20)] {
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/cron_jobs_execution_log"))
            .and(query_param("estado", format!("eq.{estado}")))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-range", format!("0-0/{total}")),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-0/1000"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/cron_jobs_execution_log"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"job_id": "daily_price_update", "start_time": "2026-01-05T02:00:00Z",
             "end_time": "2026-01-05T02:00:01Z", "duracion_ms": 1000, "estado": "exitoso"},
            {"job_id": "daily_price_update", "start_time": "2026-01-04T02:00:00Z",
             "end_time": "2026-01-04T02:00:03Z", "duracion_ms": 3000, "estado": "fallido"}
        ])))
        .mount(&server)
        .await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(get("/api/v1/cron/metrics?limit=2"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "total_executions": 1000,
            "successful": 900,
            "failed": 80,
            "partial": 20,
            "avg_execution_time": 2000
        })
    );
}

#[tokio::test]
async fn metrics_surfaces_store_failure_as_bad_gateway() {
    let server = MockServer::start().await;
    mount_store_ping(&server, 500).await;
    let app = app_for(&server, open_auth(), roomy_rate_limit());

    let response = app
        .oneshot(get("/api/v1/cron/metrics"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["code"], "upstream_unavailable");
}

#[tokio::test]
async fn protected_routes_require_bearer_token_but_health_does_not() {
    let server = MockServer::start().await;
    mount_store_ping(&server, 200).await;
    let auth = AuthState::from_keys("secret", false).expect("auth");
    let app = app_for(&server, auth, roomy_rate_limit());

    let denied = app
        .clone()
        .oneshot(get("/api/v1/cron/jobs"))
        .await
        .expect("response");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/cron/jobs")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(allowed.status(), StatusCode::OK);

    let health = app
        .oneshot(get("/api/v1/cron/health"))
        .await
        .expect("response");
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_applies_per_endpoint() {
    let server = MockServer::start().await;
    let app = app_for(
        &server,
        open_auth(),
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let first = app
        .clone()
        .oneshot(get("/api/v1/cron/jobs"))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(get("/api/v1/cron/jobs"))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_endpoint = app
        .oneshot(post_json("/api/v1/cron/execute", &json!({})))
        .await
        .expect("response");
    assert_eq!(other_endpoint.status(), StatusCode::BAD_REQUEST);
}

fn from_peer(uri: &str, peer: &str, forwarded_for: &str) -> Request<Body> {
    let mut request = Request::builder()
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .expect("request");
    let addr: SocketAddr = peer.parse().expect("peer addr");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn rate_limit_keys_on_peer_not_forwarded_for() {
    let server = MockServer::start().await;
    let app = app_for(
        &server,
        open_auth(),
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let first = app
        .clone()
        .oneshot(from_peer("/api/v1/cron/jobs", "192.0.2.7:40000", "10.0.0.1"))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let spoofed = app
        .clone()
        .oneshot(from_peer("/api/v1/cron/jobs", "192.0.2.7:40001", "10.0.0.2"))
        .await
        .expect("response");
    assert_eq!(spoofed.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_peer = app
        .oneshot(from_peer("/api/v1/cron/jobs", "198.51.100.3:40000", "10.0.0.1"))
        .await
        .expect("response");
    assert_eq!(other_peer.status(), StatusCode::OK);
}
