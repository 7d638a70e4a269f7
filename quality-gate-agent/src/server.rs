// quality-gate-agent/src/server.rs
// ============================================================================
// Module: API Server
// Description: HTTP ingestion endpoints with the sampling gate.
// Purpose: Validate, admission-control, and enqueue incoming requests.
// Dependencies: axum, axum-server, rand, quality-gate-core
// ============================================================================

//! ## Overview
//! The API server exposes `POST /ValidateResponse` and `GET /metrics`.
//! Request handlers validate headers and body, resolve the endpoint against
//! the current catalog, and pass the sampling gate before enqueueing. The
//! enqueue never blocks: a full queue drops the message, counts it, and the
//! handler still acknowledges. TLS termination is chosen from configuration
//! and in-flight handlers get a bounded drain window on shutdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use quality_gate_core::Message;
use quality_gate_core::Throughput;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::catalog::CatalogHandle;
use crate::metrics::Metrics;
use crate::queue::QueueManager;
use crate::shutdown::ShutdownSignal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the server organisation identifier.
const SERVER_ORG_ID_HEADER: &str = "serverOrgId";
/// Header carrying the FAPI interaction identifier.
const X_FAPI_INTERACTION_ID_HEADER: &str = "x-fapi-interaction-id";
/// Header carrying the transmitter organisation identifier.
const TRANSMITTER_ID_HEADER: &str = "transmitterID";
/// Header carrying the endpoint name.
const ENDPOINT_NAME_HEADER: &str = "endpointName";
/// Header carrying the API version.
const VERSION_HEADER: &str = "version";
/// Header carrying the consent identifier.
const CONSENT_ID_HEADER: &str = "consentID";
/// Version label recorded when a request supplies none.
const NO_VERSION_LABEL: &str = "N.A.";
/// Drain window granted to in-flight handlers on shutdown.
const DRAIN_WINDOW: Duration = Duration::from_secs(20);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while serving the ingestion API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// TLS material could not be loaded.
    #[error("tls config invalid: {0}")]
    Tls(String),
    /// Server failed to bind or serve.
    #[error("server failure: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Error body returned on rejected requests.
#[derive(Debug, Serialize)]
struct GenericError {
    /// Human-readable rejection reason.
    #[serde(rename = "Message")]
    message: String,
}

/// Validated header values of one ingestion request.
#[derive(Debug)]
struct MessageHeaders {
    /// Endpoint name as requested.
    endpoint: String,
    /// API version supplied by the caller, when present.
    api_version: Option<String>,
    /// Server organisation identifier.
    server_id: Uuid,
    /// FAPI interaction identifier.
    x_fapi_interaction_id: Uuid,
    /// Consent identifier, when present.
    consent_id: Option<String>,
    /// Transmitter organisation identifier, when present.
    transmitter_id: Option<Uuid>,
}

// ============================================================================
// SECTION: API Server
// ============================================================================

/// Shared state of the ingestion handlers.
#[derive(Clone)]
struct ServerState {
    /// Shared catalog for resolution and sampling rates.
    catalog: CatalogHandle,
    /// Producer handle of the message queue.
    queue: QueueManager,
    /// Agent metrics.
    metrics: Arc<Metrics>,
}

/// TLS certificate pair locations.
struct TlsPaths {
    /// PEM certificate chain path.
    cert: PathBuf,
    /// PEM private key path.
    key: PathBuf,
}

/// Ingestion API server.
pub struct ApiServer {
    /// Handler state.
    state: ServerState,
    /// Listen port.
    port: u16,
    /// TLS material; plaintext when absent.
    tls: Option<TlsPaths>,
}

impl ApiServer {
    /// Creates a plaintext server on the given port.
    #[must_use]
    pub fn new(
        catalog: CatalogHandle,
        queue: QueueManager,
        metrics: Arc<Metrics>,
        port: u16,
    ) -> Self {
        Self {
            state: ServerState {
                catalog,
                queue,
                metrics,
            },
            port,
            tls: None,
        }
    }

    /// Enables TLS termination from a PEM certificate pair.
    #[must_use]
    pub fn with_tls(mut self, cert: PathBuf, key: PathBuf) -> Self {
        self.tls = Some(TlsPaths {
            cert,
            key,
        });
        self
    }

    /// Builds the ingestion router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ValidateResponse", post(handle_validate_response))
            .route("/metrics", get(handle_metrics))
            .with_state(self.state.clone())
    }

    /// Serves requests until shutdown, draining in-flight handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding, TLS setup, or serving fails.
    pub async fn serve(self, mut signal: ShutdownSignal) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let app = self.router();
        let handle = axum_server::Handle::new();
        let watcher = handle.clone();
        tokio::spawn(async move {
            signal.triggered().await;
            watcher.graceful_shutdown(Some(DRAIN_WINDOW));
        });

        info!(port = self.port, https = self.tls.is_some(), "starting the server");
        match &self.tls {
            Some(paths) => {
                let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    paths.cert.clone(),
                    paths.key.clone(),
                )
                .await
                .map_err(|err| ServerError::Tls(err.to_string()))?;
                axum_server::bind_rustls(addr, config)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|err| ServerError::Io(err.to_string()))
            }
            None => axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(|err| ServerError::Io(err.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /ValidateResponse`.
async fn handle_validate_response(
    State(state): State<ServerState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    state.metrics.increase_requests_received();

    let parsed = match parse_message_headers(&headers) {
        Ok(parsed) => parsed,
        Err(message) => {
            state.metrics.increase_bad_requests_received();
            return reject(StatusCode::BAD_REQUEST, message);
        }
    };

    let Ok(body) = body else {
        return reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read request body.".to_string(),
        );
    };
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        state.metrics.increase_bad_requests_received();
        return reject(StatusCode::BAD_REQUEST, "body: Not a Valid JSON Message.".to_string());
    }

    let Some(resolution) = state.catalog.resolve_endpoint(&parsed.endpoint) else {
        state.metrics.record_unsupported_endpoint(&parsed.endpoint, NO_VERSION_LABEL);
        return reject(
            StatusCode::BAD_REQUEST,
            format!("{ENDPOINT_NAME_HEADER}: Not found or bad format."),
        );
    };
    if let Some(version) = &parsed.api_version {
        if *version != resolution.api_version {
            state.metrics.record_unsupported_endpoint(&parsed.endpoint, version);
            return reject(
                StatusCode::BAD_REQUEST,
                format!("{VERSION_HEADER}: not supported for endpoint: {}", parsed.endpoint),
            );
        }
    }

    if must_validate(&state.catalog, resolution.endpoint.throughput) {
        let message = Message {
            endpoint: parsed.endpoint,
            api_version: parsed.api_version,
            http_method: method.to_string(),
            server_id: parsed.server_id,
            x_fapi_interaction_id: parsed.x_fapi_interaction_id,
            consent_id: parsed.consent_id,
            transmitter_id: parsed.transmitter_id,
            raw_body: body.to_vec(),
        };
        if !state.queue.try_enqueue(message) {
            state.metrics.increase_queue_full();
            warn!("message queue full, dropping message");
        }
    }

    state.metrics.record_response_duration(started);
    (StatusCode::OK, "Message enqueued for processing!").into_response()
}

/// Handles `GET /metrics`.
async fn handle_metrics(State(state): State<ServerState>) -> Response {
    match state.metrics.render() {
        Ok(exposition) => (StatusCode::OK, exposition).into_response(),
        Err(err) => reject(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Builds a JSON rejection response.
fn reject(status: StatusCode, message: String) -> Response {
    (
        status,
        axum::Json(GenericError {
            message,
        }),
    )
        .into_response()
}

// ============================================================================
// SECTION: Header Validation
// ============================================================================

/// Extracts and validates the ingestion headers.
fn parse_message_headers(headers: &HeaderMap) -> Result<MessageHeaders, String> {
    let server_id = required_uuid(headers, SERVER_ORG_ID_HEADER)?;
    let x_fapi_interaction_id = required_uuid(headers, X_FAPI_INTERACTION_ID_HEADER)?;

    let transmitter_id = match optional_header(headers, TRANSMITTER_ID_HEADER) {
        Some(value) => Some(
            Uuid::parse_str(&value).map_err(|_| format!("{TRANSMITTER_ID_HEADER}: bad format."))?,
        ),
        None => None,
    };

    let endpoint = optional_header(headers, ENDPOINT_NAME_HEADER)
        .ok_or_else(|| format!("{ENDPOINT_NAME_HEADER}: Not found or bad format."))?;

    Ok(MessageHeaders {
        endpoint,
        api_version: optional_header(headers, VERSION_HEADER),
        server_id,
        x_fapi_interaction_id,
        consent_id: optional_header(headers, CONSENT_ID_HEADER),
        transmitter_id,
    })
}

/// Reads a required UUID header.
fn required_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, String> {
    let value = optional_header(headers, name)
        .ok_or_else(|| format!("{name}: Not found or bad format."))?;
    Uuid::parse_str(&value).map_err(|_| format!("{name}: Not found or bad format."))
}

/// Reads an optional header, treating empty values as absent.
fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

// ============================================================================
// SECTION: Sampling Gate
// ============================================================================

/// Decides whether a request passes the sampling gate.
///
/// A rate of 100 always admits and a rate of 0 never admits, without
/// consulting the random source.
fn must_validate(catalog: &CatalogHandle, throughput: Throughput) -> bool {
    let rate = catalog.validation_rate(throughput);
    if rate >= 100 {
        return true;
    }
    if rate == 0 {
        return false;
    }
    draw_percentile() < rate
}

/// Draws a random integer in `[0, 100]` from the cryptographic source.
///
/// Fails closed: a failing source reports 100, which no rate admits.
fn draw_percentile() -> u8 {
    let mut buf = [0_u8; 4];
    if OsRng.try_fill_bytes(&mut buf).is_err() {
        return 100;
    }
    (u32::from_le_bytes(buf) % 101) as u8
}

// ============================================================================
// SECTION: Tests
// ============================================================================
