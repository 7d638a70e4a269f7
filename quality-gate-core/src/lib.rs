// quality-gate-core/src/lib.rs
// ============================================================================
// Module: Quality Gate Core
// Description: Domain model for the data-quality telemetry agent.
// Purpose: Provide messages, catalog types, reports, validation, and masking.
// Dependencies: serde, serde_json, jsonschema, chrono, uuid
// ============================================================================

//! ## Overview
//! This crate holds the shared domain model of the quality-gate agent: the
//! unit of work flowing through the validation pipeline, the versioned
//! endpoint catalog distributed by the central collection service, the report
//! wire shapes submitted back to it, JSON-Schema validation with normalized
//! error paths, and the structural masking fold applied to sampled payloads.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod masking;
pub mod message;
pub mod report;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::ApiGroupSetting;
pub use catalog::ApiSetting;
pub use catalog::ConfigurationSettings;
pub use catalog::EndpointResolution;
pub use catalog::EndpointSetting;
pub use catalog::ReportSettings;
pub use catalog::SecuritySettings;
pub use catalog::Throughput;
pub use catalog::ValidationSettings;
pub use masking::scramble_payload;
pub use message::Message;
pub use message::MessageResult;
pub use message::ValidationResult;
pub use report::ApplicationConfiguration;
pub use report::ApplicationMetrics;
pub use report::ConfigurationUpdateError;
pub use report::ConfigurationUpdateStatus;
pub use report::EndpointSummary;
pub use report::EndpointSummaryDetail;
pub use report::FieldDetail;
pub use report::MetricObject;
pub use report::Report;
pub use report::ServerSummary;
pub use report::UnsupportedEndpoint;
pub use report::fold_server_summaries;
pub use validator::SchemaValidator;
pub use validator::ValidatorError;
