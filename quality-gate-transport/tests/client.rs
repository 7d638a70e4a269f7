// quality-gate-transport/tests/client.rs
// ============================================================================
// Module: Report Server Client Tests
// Description: Fetch retries, hard failures, and authenticated submission.
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use quality_gate_core::Report;
use quality_gate_transport::ReportServerClient;
use quality_gate_transport::ReportTransport;
use quality_gate_transport::TransportError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const ORG_ID: &str = "11111111-1111-1111-1111-111111111111";

async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

fn signed_token(exp_offset: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + exp_offset;
    let payload = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp}}}"));
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2ln")
}

fn catalog_document() -> &'static str {
    r#"{"Version":"v7","ValidationSettings":{"HighTroughputValidationRate":10}}"#
}

// ============================================================================
// SECTION: Catalog Fetches
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn fetch_settings_retries_transient_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/settings/configurationSettings.json",
            get(|State(calls): State<Arc<AtomicUsize>>| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                } else {
                    (StatusCode::OK, catalog_document().to_string())
                }
            }),
        )
        .with_state(Arc::clone(&calls));
    let base = spawn_stub(app).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    let catalog = client.fetch_settings().await.expect("settings");
    assert_eq!(catalog.version, "v7");
    assert_eq!(catalog.validation.high_rate, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_settings_missing_key_fails_without_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/settings/configurationSettings.json",
            get(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                "<Error><Code>NoSuchKey</Code></Error>".to_string()
            }),
        )
        .with_state(Arc::clone(&calls));
    let base = spawn_stub(app).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    let err = client.fetch_settings().await.expect_err("missing key");
    assert!(matches!(err, TransportError::NotFound(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_settings_forbidden_fails_without_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/settings/configurationSettings.json",
            get(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                StatusCode::FORBIDDEN
            }),
        )
        .with_state(Arc::clone(&calls));
    let base = spawn_stub(app).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    let err = client.fetch_settings().await.expect_err("forbidden");
    assert!(matches!(err, TransportError::Forbidden));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_endpoints_uses_normalized_document_path() {
    let app = Router::new().route(
        "/settings/opendata/accounts/2.0.0/response/endpoints.json",
        get(|| async {
            r#"[{"endpoint":"/accounts","body_schema":"","throughput":"HIGH"}]"#
        }),
    );
    let base = spawn_stub(app).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    let endpoints =
        client.fetch_endpoints("opendata", "accounts", "2.0.0").await.expect("endpoints");
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].endpoint, "/accounts");
}

// ============================================================================
// SECTION: Report Submission
// ============================================================================

#[derive(Clone)]
struct SubmitState {
    token_calls: Arc<AtomicUsize>,
    seen_auth: Arc<std::sync::Mutex<Vec<String>>>,
}

fn submit_app(state: SubmitState) -> Router {
    Router::new()
        .route(
            "/token",
            post(|State(state): State<SubmitState>| async move {
                state.token_calls.fetch_add(1, Ordering::SeqCst);
                let token = signed_token(3600);
                (
                    StatusCode::OK,
                    format!(
                        "{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\",\"expires_in\":300}}"
                    ),
                )
            }),
        )
        .route(
            "/report",
            post(|State(state): State<SubmitState>, headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                state.seen_auth.lock().expect("lock").push(auth);
                StatusCode::OK
            }),
        )
        .with_state(state)
}

#[tokio::test(flavor = "multi_thread")]
async fn send_report_attaches_bearer_token() {
    let state = SubmitState {
        token_calls: Arc::new(AtomicUsize::new(0)),
        seen_auth: Arc::new(std::sync::Mutex::new(Vec::new())),
    };
    let base = spawn_stub(submit_app(state.clone())).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    client.send_report(&Report::default()).await.expect("send");

    let seen = state.seen_auth.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("Bearer eyJhbGciOiJIUzI1NiJ9."));
}

#[tokio::test(flavor = "multi_thread")]
async fn send_report_reuses_cached_token_until_expiry() {
    let state = SubmitState {
        token_calls: Arc::new(AtomicUsize::new(0)),
        seen_auth: Arc::new(std::sync::Mutex::new(Vec::new())),
    };
    let base = spawn_stub(submit_app(state.clone())).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    client.send_report(&Report::default()).await.expect("first send");
    client.send_report(&Report::default()).await.expect("second send");

    assert_eq!(state.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.seen_auth.lock().expect("lock").len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_report_surfaces_rejection_status() {
    let app = Router::new()
        .route(
            "/token",
            post(|| async {
                let token = signed_token(3600);
                format!("{{\"access_token\":\"{token}\"}}")
            }),
        )
        .route("/report", post(|| async { StatusCode::BAD_GATEWAY }));
    let base = spawn_stub(app).await;

    let client = ReportServerClient::new(base, ORG_ID).expect("client");
    let err = client.send_report(&Report::default()).await.expect_err("rejected");
    assert!(matches!(err, TransportError::Status(502)));
}
