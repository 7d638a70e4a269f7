// quality-gate-core/src/message.rs
// ============================================================================
// Module: Validation Messages
// Description: Unit of work flowing through the validation pipeline.
// Purpose: Carry admitted payloads and typed validation outcomes.
// Dependencies: serde_json, uuid
// ============================================================================

//! ## Overview
//! A [`Message`] is built by the API server from an admitted request and is
//! immutable after enqueue. The worker turns it into a [`MessageResult`] that
//! the aggregator and the evidence store consume independently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// SECTION: Message
// ============================================================================

/// Payload admitted for validation.
///
/// # Invariants
/// - `raw_body` parsed as JSON at admission time; the worker re-decodes it.
/// - Fields are never mutated after the message enters the queue.
#[derive(Debug, Clone)]
pub struct Message {
    /// Name of the endpoint requested, as received in the header.
    pub endpoint: String,
    /// API version supplied by the caller, when present.
    pub api_version: Option<String>,
    /// HTTP method of the validated exchange.
    pub http_method: String,
    /// Organisation identifier of the server producing the response.
    pub server_id: Uuid,
    /// FAPI interaction identifier correlating the exchange.
    pub x_fapi_interaction_id: Uuid,
    /// Consent identifier, when the exchange carries one.
    pub consent_id: Option<String>,
    /// Organisation identifier of the transmitter, when present.
    pub transmitter_id: Option<Uuid>,
    /// Raw response body as received.
    pub raw_body: Vec<u8>,
}

impl Message {
    /// Decodes the raw body into a generic JSON object.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error when the body is not a JSON object.
    pub fn decode_object(&self) -> Result<Map<String, Value>, serde_json::Error> {
        serde_json::from_slice(&self.raw_body)
    }

    /// Renders the interaction identifier used in reports.
    ///
    /// When a consent identifier is present the rendered form is
    /// `"[{consent}] - [{interaction}]"`.
    #[must_use]
    pub fn rendered_interaction_id(&self) -> String {
        match &self.consent_id {
            Some(consent) => format!("[{consent}] - [{}]", self.x_fapi_interaction_id),
            None => self.x_fapi_interaction_id.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Validation Outcomes
// ============================================================================

/// Outcome of validating one payload against a schema.
///
/// # Invariants
/// - `errors` is empty exactly when `valid` is true.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    /// Whether the payload satisfied the schema.
    pub valid: bool,
    /// Error descriptions grouped by normalized field path.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationResult {
    /// Returns a passing result with no errors.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            valid: true,
            errors: BTreeMap::new(),
        }
    }

    /// Returns a failing result with a single error entry.
    #[must_use]
    pub fn failed(field: impl Into<String>, description: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.into(), vec![description.into()]);
        Self {
            valid: false,
            errors,
        }
    }
}

/// Validation outcome paired with the identifying fields of its message.
#[derive(Debug, Clone)]
pub struct MessageResult {
    /// Name of the endpoint requested.
    pub endpoint: String,
    /// HTTP method of the validated exchange.
    pub http_method: String,
    /// Organisation identifier of the server, rendered as text.
    pub server_id: String,
    /// Transmitter organisation identifier, when the message carried one.
    pub transmitter_id: Option<String>,
    /// Rendered interaction identifier (see [`Message::rendered_interaction_id`]).
    pub x_fapi_interaction_id: String,
    /// Whether the payload satisfied the schema.
    pub valid: bool,
    /// Error descriptions grouped by normalized field path.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl MessageResult {
    /// Builds a result from a message and its validation outcome.
    #[must_use]
    pub fn from_outcome(message: &Message, outcome: ValidationResult) -> Self {
        Self {
            endpoint: message.endpoint.clone(),
            http_method: message.http_method.clone(),
            server_id: message.server_id.to_string(),
            transmitter_id: message.transmitter_id.map(|id| id.to_string()),
            x_fapi_interaction_id: message.rendered_interaction_id(),
            valid: outcome.valid,
            errors: outcome.errors,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
