// quality-gate-transport/src/client.rs
// ============================================================================
// Module: Report Server Client
// Description: HTTP access to catalog files and report submission.
// Purpose: Implement the ReportTransport capability with bounded retries.
// Dependencies: reqwest, async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`ReportServerClient`] owns an [`HttpTransport`] by composition and
//! implements [`ReportTransport`]. Catalog fetches retry three times with one
//! second spacing; a `403` or a body containing `NoSuchKey` fails immediately.
//! Report submission authenticates with a cached client-credentials token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use quality_gate_core::ConfigurationSettings;
use quality_gate_core::EndpointSetting;
use quality_gate_core::Report;
use reqwest::Client;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::token::JwkToken;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Token endpoint path on the central server.
const TOKEN_PATH: &str = "/token";
/// Report endpoint path on the central server.
const REPORT_PATH: &str = "/report";
/// Settings root path on the central server.
const SETTINGS_PATH: &str = "/settings";
/// Catalog document filename.
const SETTINGS_FILE: &str = "configurationSettings.json";
/// Retries for catalog fetches within one call.
const FETCH_RETRIES: u32 = 3;
/// Spacing between fetch retries.
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default request timeout.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the central server client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    Build(String),
    /// Request failed at the transport level.
    #[error("request failure: {0}")]
    Request(String),
    /// Server answered with a forbidden status.
    #[error("forbidden status code")]
    Forbidden,
    /// Server answered with an unexpected status.
    #[error("invalid status code: {0}")]
    Status(u16),
    /// Requested configuration file does not exist on the server.
    #[error("configuration file not found: {0}")]
    NotFound(String),
    /// Token request failed.
    #[error("token request failed: {0}")]
    Token(String),
    /// Response body failed to deserialize.
    #[error("response decode failure: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Transport Capability
// ============================================================================

/// Capability used by the agent to talk to the central collection service.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    /// Fetches the top-level catalog document.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the document cannot be fetched or
    /// decoded.
    async fn fetch_settings(&self) -> Result<ConfigurationSettings, TransportError>;

    /// Fetches the endpoint settings document for one API.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the document cannot be fetched or
    /// decoded.
    async fn fetch_endpoints(
        &self,
        group_base: &str,
        api_base: &str,
        version: &str,
    ) -> Result<Vec<EndpointSetting>, TransportError>;

    /// Submits a report with bearer authentication.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when authentication or submission fails.
    async fn send_report(&self, report: &Report) -> Result<(), TransportError>;
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Plain HTTP access to the central server.
pub struct HttpTransport {
    /// Shared HTTP client with the default request timeout.
    client: Client,
    /// Base URL of the central server, without a trailing slash.
    server_url: String,
}

impl HttpTransport {
    /// Creates a transport for the given server URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] when the HTTP client cannot be
    /// constructed.
    pub fn new(server_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Build(err.to_string()))?;
        Ok(Self {
            client,
            server_url: server_url.into(),
        })
    }

    /// Executes a GET request with bounded retries.
    ///
    /// Transport failures and unexpected statuses are retried with one second
    /// spacing; a forbidden status or a `NoSuchKey` body fails immediately.
    async fn execute_get(&self, path: &str, retries: u32) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}{path}", self.server_url);
        debug!(%url, "executing get request");
        let mut attempts_left = retries;
        loop {
            let outcome = self.client.get(&url).send().await;
            let retriable = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::FORBIDDEN {
                        warn!(%url, "forbidden status code");
                        return Err(TransportError::Forbidden);
                    }
                    if status.is_success() {
                        let body = response
                            .bytes()
                            .await
                            .map_err(|err| TransportError::Request(err.to_string()))?;
                        if body_reports_missing_key(&body) {
                            warn!(%url, "configuration file not found");
                            return Err(TransportError::NotFound(url));
                        }
                        return Ok(body.to_vec());
                    }
                    warn!(%url, status = status.as_u16(), "unexpected status code");
                    TransportError::Status(status.as_u16())
                }
                Err(err) => TransportError::Request(err.to_string()),
            };
            if attempts_left == 0 {
                return Err(retriable);
            }
            attempts_left -= 1;
            info!(%url, attempts_left, "retrying request");
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
}

/// Returns true when the body names a missing storage key.
fn body_reports_missing_key(body: &[u8]) -> bool {
    String::from_utf8_lossy(body).contains("NoSuchKey")
}

/// Builds the normalized endpoints document path for one API.
///
/// Segments are joined with doubled slashes, `ParameterData//` segments are
/// stripped, and the remainder collapses onto single slashes.
#[must_use]
pub fn endpoints_document_path(group_base: &str, api_base: &str, version: &str) -> String {
    let joined = format!("{group_base}//{api_base}//{version}//response//");
    let stripped = joined.replace("ParameterData//", "");
    format!("{}endpoints.json", stripped.replace("//", "/"))
}

// ============================================================================
// SECTION: Report Server Client
// ============================================================================

/// Central server client implementing [`ReportTransport`].
pub struct ReportServerClient {
    /// HTTP transport to the central server.
    http: HttpTransport,
    /// Organisation identifier used as the OAuth client id.
    organisation_id: String,
    /// Cached bearer token, refreshed when expired.
    token: Mutex<Option<JwkToken>>,
}

impl ReportServerClient {
    /// Creates a client for the given server URL and organisation.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        server_url: impl Into<String>,
        organisation_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            http: HttpTransport::new(server_url)?,
            organisation_id: organisation_id.into(),
            token: Mutex::new(None),
        })
    }

    /// Returns a valid bearer token, requesting a fresh one when needed.
    async fn bearer_token(&self) -> Result<String, TransportError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                debug!("token is valid, using previous token");
                return Ok(token.access_token.clone());
            }
        }

        info!("requesting new token");
        let url = format!("{}{TOKEN_PATH}", self.http.server_url);
        let response = self
            .http
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.organisation_id.as_str()),
            ])
            .send()
            .await
            .map_err(|err| TransportError::Token(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Token(format!(
                "request failed with status code: {}",
                status.as_u16()
            )));
        }
        let token: JwkToken = response
            .json()
            .await
            .map_err(|err| TransportError::Token(err.to_string()))?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

#[async_trait]
impl ReportTransport for ReportServerClient {
    async fn fetch_settings(&self) -> Result<ConfigurationSettings, TransportError> {
        info!("loading configuration settings");
        let path = format!("{SETTINGS_PATH}/{SETTINGS_FILE}");
        let body = self.http.execute_get(&path, FETCH_RETRIES).await?;
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn fetch_endpoints(
        &self,
        group_base: &str,
        api_base: &str,
        version: &str,
    ) -> Result<Vec<EndpointSetting>, TransportError> {
        let document = endpoints_document_path(group_base, api_base, version);
        debug!(%document, "loading api endpoint settings");
        let path = format!("{SETTINGS_PATH}/{document}");
        let body = self.http.execute_get(&path, FETCH_RETRIES).await?;
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn send_report(&self, report: &Report) -> Result<(), TransportError> {
        info!("sending report to central server");
        let token = self.bearer_token().await?;
        let url = format!("{}{REPORT_PATH}", self.http.server_url);
        let response = self
            .http
            .client
            .post(&url)
            .bearer_auth(token)
            .json(report)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "error sending report");
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
