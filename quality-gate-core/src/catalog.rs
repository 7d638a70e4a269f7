// quality-gate-core/src/catalog.rs
// ============================================================================
// Module: Endpoint Catalog
// Description: Versioned catalog of API groups, endpoints, and rates.
// Purpose: Model the configuration distributed by the central server.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The catalog is the set of API groups, APIs, endpoints, and schemas in
//! force at a given version. Endpoint lists are shared through [`Arc`] so an
//! unchanged `(group, api, version)` pair is carried forward across catalog
//! refreshes without a refetch or a copy. Field renames follow the settings
//! document published by the central collection service.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;

// ============================================================================
// SECTION: Throughput Classes
// ============================================================================

/// Coarse throughput bucket assigned per endpoint.
///
/// # Invariants
/// - Wire labels are stable; unrecognized labels fall back to [`Self::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Throughput {
    /// Endpoints with extremely high call volume.
    #[serde(rename = "EXTREMELY_HIGH")]
    ExtremelyHigh,
    /// Endpoints with high call volume.
    #[serde(rename = "HIGH")]
    High,
    /// Endpoints with medium call volume.
    #[serde(rename = "MEDIUM")]
    Medium,
    /// Endpoints with low call volume.
    #[serde(rename = "LOW")]
    Low,
    /// Endpoints with very low call volume.
    #[serde(rename = "VERY_LOW")]
    VeryLow,
    /// Label not recognized by this build; treated as always admitted.
    #[default]
    #[serde(other)]
    Unknown,
}

// ============================================================================
// SECTION: Catalog Types
// ============================================================================

/// Validation settings for a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct EndpointSetting {
    /// Endpoint path suffix under the API endpoint base.
    pub endpoint: String,
    /// JSON Schema for the response body; empty means trivially valid.
    #[serde(rename = "body_schema", default)]
    pub body_schema: String,
    /// Throughput class controlling the sampling rate.
    #[serde(default)]
    pub throughput: Throughput,
}

/// Settings for one API inside a group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSetting {
    /// API name, unique within its group.
    #[serde(rename = "api")]
    pub name: String,
    /// Base path of the API settings folder on the central server.
    #[serde(rename = "base_path")]
    pub base_path: String,
    /// Version of the API settings.
    pub version: String,
    /// Base URL prefix shared by every endpoint of this API.
    #[serde(rename = "endpoint_base")]
    pub endpoint_base: String,
    /// Endpoint list, fetched separately and shared across catalog swaps.
    #[serde(rename = "endpoint_List", default)]
    pub endpoints: Arc<Vec<EndpointSetting>>,
}

/// Validation settings for an API group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiGroupSetting {
    /// Group name, unique within the catalog.
    pub group: String,
    /// Base path of the group settings folder on the central server.
    #[serde(rename = "base_path")]
    pub base_path: String,
    /// APIs belonging to this group.
    #[serde(rename = "api_list", default)]
    pub api_list: Vec<ApiSetting>,
}

/// Validation settings for the whole catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationSettings {
    /// API group tree.
    #[serde(rename = "APIGroupSettings", default)]
    pub api_groups: Vec<ApiGroupSetting>,
    /// Sampling rate in percent for extremely high throughput endpoints.
    #[serde(rename = "ExtremelyHighTroughputValidationRate", default)]
    pub extremely_high_rate: u8,
    /// Sampling rate in percent for high throughput endpoints.
    #[serde(rename = "HighTroughputValidationRate", default)]
    pub high_rate: u8,
    /// Sampling rate in percent for medium throughput endpoints.
    #[serde(rename = "MediumTroughputValidationRate", default)]
    pub medium_rate: u8,
    /// Sampling rate in percent for low throughput endpoints.
    #[serde(rename = "LowTroughputValidationRate", default)]
    pub low_rate: u8,
    /// Sampling rate in percent for very low throughput endpoints.
    #[serde(rename = "VeryLowTroughputValidationRate", default)]
    pub very_low_rate: u8,
}

/// Reporting cadence distributed with the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportSettings {
    /// Report execution window in minutes.
    #[serde(rename = "ReportExecutionWindow", default)]
    pub execution_window: u32,
    /// Result count that triggers an early flush.
    #[serde(rename = "SendOnReportNumber", default)]
    pub send_on_number: u32,
}

/// Security settings distributed with the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecuritySettings {
    /// Attribute names whose values must be masked in evidence samples.
    #[serde(rename = "AttributesToMask", default)]
    pub attributes_to_mask: Vec<String>,
}

impl SecuritySettings {
    /// Returns true when the attribute value must be masked.
    ///
    /// The comparison is case-insensitive.
    #[must_use]
    pub fn have_to_mask(&self, attribute: &str) -> bool {
        self.attributes_to_mask.iter().any(|name| name.eq_ignore_ascii_case(attribute))
    }
}

/// Catalog of endpoint settings in force at a given version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigurationSettings {
    /// Version label of this catalog.
    #[serde(rename = "Version")]
    pub version: String,
    /// Validation settings including the group tree and sampling rates.
    #[serde(rename = "ValidationSettings", default)]
    pub validation: ValidationSettings,
    /// Reporting cadence settings.
    #[serde(rename = "ReportSettings", default)]
    pub report: ReportSettings,
    /// Security settings including the masking attribute set.
    #[serde(rename = "SecuritySettings", default)]
    pub security: SecuritySettings,
}

// ============================================================================
// SECTION: Endpoint Resolution
// ============================================================================

/// Catalog location of a resolved endpoint.
#[derive(Debug, Clone)]
pub struct EndpointResolution {
    /// Group the endpoint belongs to.
    pub group: String,
    /// API the endpoint belongs to.
    pub api: String,
    /// Version of the owning API settings.
    pub api_version: String,
    /// Base path of the owning API settings folder.
    pub base_path: String,
    /// Settings of the resolved endpoint.
    pub endpoint: EndpointSetting,
}

impl ConfigurationSettings {
    /// Resolves an endpoint name against the catalog.
    ///
    /// Matching is case-insensitive and trimmed: the API is selected when its
    /// endpoint base is a substring of the requested name, and within that
    /// API the concatenation of endpoint base and endpoint suffix must match
    /// the requested name exactly.
    #[must_use]
    pub fn resolve_endpoint(&self, endpoint_name: &str) -> Option<EndpointResolution> {
        let requested = endpoint_name.trim().to_ascii_lowercase();
        for group in &self.validation.api_groups {
            for api in &group.api_list {
                let base = api.endpoint_base.trim().to_ascii_lowercase();
                if !requested.contains(&base) {
                    continue;
                }
                for endpoint in api.endpoints.iter() {
                    let full = format!("{base}{}", endpoint.endpoint.trim().to_ascii_lowercase());
                    if full == requested {
                        return Some(EndpointResolution {
                            group: group.group.clone(),
                            api: api.name.clone(),
                            api_version: api.version.clone(),
                            base_path: api.base_path.clone(),
                            endpoint: endpoint.clone(),
                        });
                    }
                }
            }
        }
        None
    }

    /// Returns the sampling rate in percent for a throughput class.
    ///
    /// Unknown classes are always admitted.
    #[must_use]
    pub fn validation_rate(&self, throughput: Throughput) -> u8 {
        match throughput {
            Throughput::ExtremelyHigh => self.validation.extremely_high_rate,
            Throughput::High => self.validation.high_rate,
            Throughput::Medium => self.validation.medium_rate,
            Throughput::Low => self.validation.low_rate,
            Throughput::VeryLow => self.validation.very_low_rate,
            Throughput::Unknown => 100,
        }
    }

    /// Returns the group settings with the given name, when present.
    #[must_use]
    pub fn group_setting(&self, group: &str) -> Option<&ApiGroupSetting> {
        self.validation.api_groups.iter().find(|setting| setting.group == group)
    }
}

impl ApiGroupSetting {
    /// Returns the API settings with the given name, when present.
    #[must_use]
    pub fn api_setting(&self, api: &str) -> Option<&ApiSetting> {
        self.api_list.iter().find(|setting| setting.name == api)
    }
}
