// quality-gate-core/src/report.rs
// ============================================================================
// Module: Report Model
// Description: Wire shapes for the periodic quality report.
// Purpose: Serialize aggregated results for the central collection service.
// Dependencies: serde, chrono
// ============================================================================

//! ## Overview
//! The report is derived purely from an aggregation snapshot, a metrics
//! snapshot, and the configuration status at flush time. Field names are
//! case-sensitive on the wire and ordering of endpoints and fields follows
//! insertion order, which [`fold_server_summaries`] preserves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::message::MessageResult;

// ============================================================================
// SECTION: Metric Payloads
// ============================================================================

/// Named metric value attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricObject {
    /// Name of the metric.
    #[serde(rename = "Key")]
    pub key: String,
    /// Rendered value of the metric.
    #[serde(rename = "Value")]
    pub value: String,
}

/// Collection of metric values recorded for one report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    /// Metric values in recording order.
    #[serde(rename = "Values", default)]
    pub values: Vec<MetricObject>,
}

// ============================================================================
// SECTION: Configuration Status
// ============================================================================

/// Error recorded during a configuration update attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationUpdateError {
    /// Moment the update attempt failed.
    #[serde(rename = "ErrorDate")]
    pub error_date: DateTime<Utc>,
    /// Failure description.
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

/// Status of the configuration control loop at flush time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationUpdateStatus {
    /// Version of the catalog in force.
    #[serde(rename = "ConfigurationVersion")]
    pub configuration_version: String,
    /// Moment of the most recent update attempt.
    #[serde(rename = "LastExecutionDate")]
    pub last_execution_date: Option<DateTime<Utc>>,
    /// Moment of the most recent successful update.
    #[serde(rename = "LastUpdatedDate")]
    pub last_updated_date: Option<DateTime<Utc>>,
    /// Errors accumulated since the last successful update.
    #[serde(rename = "ConfigurationUpdateError", default)]
    pub update_errors: Vec<ConfigurationUpdateError>,
}

/// Agent-side configuration snapshot attached to a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfiguration {
    /// Version of the agent.
    #[serde(rename = "ApplicationVersion")]
    pub application_version: String,
    /// Environment label of the deployment.
    #[serde(rename = "Environment")]
    pub environment: String,
    /// Status of the configuration control loop.
    #[serde(rename = "ConfigurationUpdateStatus")]
    pub update_status: ConfigurationUpdateStatus,
    /// Effective report execution window, rendered as text.
    #[serde(rename = "ReportExecutionWindow")]
    pub report_execution_window: String,
    /// Effective count-trigger threshold, rendered as text.
    #[serde(rename = "ReportExecutionNumber")]
    pub report_execution_number: String,
    /// Application mode, TRANSMITTER or RECEIVER.
    #[serde(rename = "ApplicationMode")]
    pub application_mode: String,
    /// Process-unique application identifier.
    #[serde(rename = "ApplicationID")]
    pub application_id: String,
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Unsupported endpoint observation attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedEndpoint {
    /// Endpoint name as requested.
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    /// Version requested, `"N.A."` when none was supplied.
    #[serde(rename = "Version")]
    pub version: String,
    /// Number of times the combination was requested.
    #[serde(rename = "Count")]
    pub count: u64,
    /// Reason the combination was rejected.
    #[serde(rename = "Error")]
    pub error: String,
}

/// Occurrences of one error description under a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDetail {
    /// Description of the error found.
    #[serde(rename = "ErrorType")]
    pub error_type: String,
    /// Interaction identifiers that exhibited this error.
    #[serde(rename = "XFapiList", default)]
    pub x_fapi_list: Vec<String>,
    /// Number of times the error was found.
    #[serde(rename = "TotalCount")]
    pub total_count: u64,
}

/// Error details grouped under one field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummaryDetail {
    /// Normalized field path.
    #[serde(rename = "Field")]
    pub field: String,
    /// Error occurrences for the field.
    #[serde(rename = "Details", default)]
    pub details: Vec<FieldDetail>,
}

/// Validation summary for one endpoint of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    /// Endpoint name as requested.
    #[serde(rename = "EndpointName")]
    pub endpoint_name: String,
    /// Total requests validated for the endpoint.
    #[serde(rename = "TotalRequests")]
    pub total_requests: u64,
    /// Requests that failed validation.
    #[serde(rename = "ValidationErrors")]
    pub validation_errors: u64,
    /// Error details in insertion order.
    #[serde(rename = "Detail", default)]
    pub detail: Vec<EndpointSummaryDetail>,
}

/// Validation summary for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    /// Server organisation identifier.
    #[serde(rename = "ServerID")]
    pub server_id: String,
    /// Total requests validated for the server.
    #[serde(rename = "TotalRequests")]
    pub total_requests: u64,
    /// Per-endpoint summaries in insertion order.
    #[serde(rename = "EndpointSummary", default)]
    pub endpoint_summary: Vec<EndpointSummary>,
}

/// Report submitted to the central collection service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Metric values recorded for the reporting window.
    #[serde(rename = "Metrics")]
    pub metrics: ApplicationMetrics,
    /// Agent-side configuration snapshot.
    #[serde(rename = "ApplicationConfiguration")]
    pub application_configuration: ApplicationConfiguration,
    /// Transmitter organisation the summaries belong to.
    #[serde(rename = "ClientID")]
    pub client_id: String,
    /// Organisation identifier of the reporting agent.
    #[serde(rename = "DataOwnerID")]
    pub data_owner_id: String,
    /// Unsupported endpoint observations for the window.
    #[serde(rename = "UnsupportedEndpoints", default)]
    pub unsupported_endpoints: Vec<UnsupportedEndpoint>,
    /// Per-server validation summaries.
    #[serde(rename = "ServerSummary", default)]
    pub server_summary: Vec<ServerSummary>,
}

// ============================================================================
// SECTION: Summary Folding
// ============================================================================

/// Folds grouped message results into per-server summaries.
///
/// Endpoints and fields appear in the order they are first observed within
/// each server's result list.
#[must_use]
pub fn fold_server_summaries(
    grouped: &BTreeMap<String, Vec<MessageResult>>,
) -> Vec<ServerSummary> {
    let mut summaries = Vec::with_capacity(grouped.len());
    for (server_id, results) in grouped {
        let mut summary = ServerSummary {
            server_id: server_id.clone(),
            total_requests: 0,
            endpoint_summary: Vec::new(),
        };
        for result in results {
            summary.total_requests += 1;
            update_endpoint_summary(&mut summary.endpoint_summary, result);
        }
        summaries.push(summary);
    }
    summaries
}

/// Merges one result into the endpoint summary list.
fn update_endpoint_summary(summaries: &mut Vec<EndpointSummary>, result: &MessageResult) {
    if let Some(existing) =
        summaries.iter_mut().find(|summary| summary.endpoint_name == result.endpoint)
    {
        existing.total_requests += 1;
        if !result.valid {
            existing.validation_errors += 1;
            update_summary_detail(&mut existing.detail, result);
        }
        return;
    }

    let mut summary = EndpointSummary {
        endpoint_name: result.endpoint.clone(),
        total_requests: 1,
        validation_errors: 0,
        detail: Vec::new(),
    };
    if !result.valid {
        summary.validation_errors = 1;
        update_summary_detail(&mut summary.detail, result);
    }
    summaries.push(summary);
}

/// Merges the errors of one result into the field detail list.
fn update_summary_detail(details: &mut Vec<EndpointSummaryDetail>, result: &MessageResult) {
    for (field, descriptions) in &result.errors {
        let position = details.iter().position(|detail| &detail.field == field);
        let detail = match position {
            Some(index) => &mut details[index],
            None => {
                details.push(EndpointSummaryDetail {
                    field: field.clone(),
                    details: Vec::new(),
                });
                let last = details.len() - 1;
                &mut details[last]
            }
        };
        update_field_details(&mut detail.details, descriptions, &result.x_fapi_interaction_id);
    }
}

/// Merges error descriptions into the per-description occurrence list.
fn update_field_details(details: &mut Vec<FieldDetail>, descriptions: &[String], xfapi_id: &str) {
    for description in descriptions {
        if let Some(existing) =
            details.iter_mut().find(|detail| &detail.error_type == description)
        {
            existing.x_fapi_list.push(xfapi_id.to_string());
            existing.total_count += 1;
            continue;
        }
        details.push(FieldDetail {
            error_type: description.clone(),
            x_fapi_list: vec![xfapi_id.to_string()],
            total_count: 1,
        });
    }
}
