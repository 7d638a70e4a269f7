// quality-gate-transport/src/lib.rs
// ============================================================================
// Module: Quality Gate Transport
// Description: HTTP client for the central collection service.
// Purpose: Fetch catalogs, submit reports, and manage bearer tokens.
// Dependencies: reqwest, async-trait, base64, serde_json
// ============================================================================

//! ## Overview
//! This crate implements the [`ReportTransport`] capability: catalog and
//! endpoint fetches with bounded retries, report submission with a bearer
//! token, and a token cache that refreshes only when the JWT `exp` claim has
//! passed. Callers own retry-across-cycles policy; this crate only retries
//! within a single fetch.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod token;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::HttpTransport;
pub use client::ReportServerClient;
pub use client::ReportTransport;
pub use client::TransportError;
pub use client::endpoints_document_path;
pub use token::JwkToken;
