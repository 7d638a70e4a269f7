// quality-gate-transport/src/token.rs
// ============================================================================
// Module: Bearer Tokens
// Description: OAuth token payload and JWT expiry inspection.
// Purpose: Decide when a cached token must be refreshed.
// Dependencies: base64, serde_json, chrono
// ============================================================================

//! ## Overview
//! The central server issues client-credentials tokens whose lifetime is read
//! from the `exp` claim of the JWT access token. A token with a missing or
//! malformed claim is treated as expired so a fresh one is always requested.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// SECTION: Token Payload
// ============================================================================

/// Token response issued by the central server.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkToken {
    /// Bearer token attached to report submissions.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: String,
    /// Advertised lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Advertised refresh lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: u64,
    /// Not-before policy marker.
    #[serde(rename = "not-before-policy", default)]
    pub not_before_policy: u64,
    /// Scope granted to the token.
    #[serde(default)]
    pub scope: String,
}

impl JwkToken {
    /// Returns true when the access token is still usable.
    ///
    /// The decision is made from the `exp` claim of the JWT payload; a token
    /// whose claim cannot be read is reported as expired.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(expires_at) = decode_expiry(&self.access_token) else {
            return false;
        };
        Utc::now().timestamp() < expires_at
    }
}

/// Reads the `exp` claim from a JWT access token.
fn decode_expiry(access_token: &str) -> Option<i64> {
    let payload = access_token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("exp")?.as_i64()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
