// quality-gate-agent/tests/common/mod.rs
// ============================================================================
// Module: Agent Test Support
// Description: Shared fixtures and a scriptable report transport stub.
// ============================================================================

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use quality_gate_core::ApiGroupSetting;
use quality_gate_core::ApiSetting;
use quality_gate_core::ConfigurationSettings;
use quality_gate_core::EndpointSetting;
use quality_gate_core::Report;
use quality_gate_core::ReportSettings;
use quality_gate_core::SecuritySettings;
use quality_gate_core::Throughput;
use quality_gate_core::ValidationSettings;
use quality_gate_transport::ReportTransport;
use quality_gate_transport::TransportError;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

pub const ORG_ID: &str = "99999999-9999-9999-9999-999999999999";
pub const SERVER_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const XFAPI_ID: &str = "22222222-2222-2222-2222-222222222222";

/// Builds a catalog with one accounts API and a required-property schema.
pub fn accounts_catalog(version: &str) -> ConfigurationSettings {
    ConfigurationSettings {
        version: version.to_string(),
        validation: ValidationSettings {
            api_groups: vec![ApiGroupSetting {
                group: "accounts".to_string(),
                base_path: "opendata-accounts".to_string(),
                api_list: vec![ApiSetting {
                    name: "accounts".to_string(),
                    base_path: "accounts".to_string(),
                    version: "2.0.0".to_string(),
                    endpoint_base: "/accounts/v2".to_string(),
                    endpoints: Arc::new(vec![
                        EndpointSetting {
                            endpoint: "/accounts".to_string(),
                            body_schema: r#"{"type":"object","required":["a"]}"#.to_string(),
                            throughput: Throughput::VeryLow,
                        },
                        EndpointSetting {
                            endpoint: "/never-sampled".to_string(),
                            body_schema: String::new(),
                            throughput: Throughput::ExtremelyHigh,
                        },
                    ]),
                }],
            }],
            extremely_high_rate: 0,
            high_rate: 100,
            medium_rate: 100,
            low_rate: 100,
            very_low_rate: 100,
        },
        report: ReportSettings {
            execution_window: 60,
            send_on_number: 100_000,
        },
        security: SecuritySettings {
            attributes_to_mask: vec!["cpf".to_string()],
        },
    }
}

// ============================================================================
// SECTION: Stub Transport
// ============================================================================

/// Scriptable in-memory [`ReportTransport`].
#[derive(Default)]
pub struct StubTransport {
    /// Catalog documents returned in order; the last one repeats.
    settings_docs: Mutex<VecDeque<ConfigurationSettings>>,
    /// Endpoint documents keyed by `group_base/api_base/version`.
    endpoint_docs: Mutex<BTreeMap<String, Vec<EndpointSetting>>>,
    /// Submitted reports.
    pub reports: Mutex<Vec<Report>>,
    /// Number of catalog fetches.
    pub settings_fetches: AtomicUsize,
    /// Number of endpoint fetches.
    pub endpoint_fetches: AtomicUsize,
    /// Makes catalog fetches fail.
    pub fail_settings: AtomicBool,
    /// Makes report submissions fail.
    pub fail_send: AtomicBool,
}

impl StubTransport {
    /// Queues a catalog document response.
    pub fn push_settings(&self, settings: ConfigurationSettings) {
        self.settings_docs.lock().expect("lock").push_back(settings);
    }

    /// Registers an endpoint document for one API.
    pub fn set_endpoints(
        &self,
        group_base: &str,
        api_base: &str,
        version: &str,
        endpoints: Vec<EndpointSetting>,
    ) {
        self.endpoint_docs
            .lock()
            .expect("lock")
            .insert(format!("{group_base}/{api_base}/{version}"), endpoints);
    }

    /// Returns the submitted reports.
    pub fn submitted_reports(&self) -> Vec<Report> {
        self.reports.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ReportTransport for StubTransport {
    async fn fetch_settings(&self) -> Result<ConfigurationSettings, TransportError> {
        self.settings_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_settings.load(Ordering::SeqCst) {
            return Err(TransportError::Status(500));
        }
        let mut docs = self.settings_docs.lock().expect("lock");
        match docs.len() {
            0 => Err(TransportError::NotFound("configurationSettings.json".to_string())),
            1 => Ok(docs.front().expect("front").clone()),
            _ => Ok(docs.pop_front().expect("front")),
        }
    }

    async fn fetch_endpoints(
        &self,
        group_base: &str,
        api_base: &str,
        version: &str,
    ) -> Result<Vec<EndpointSetting>, TransportError> {
        self.endpoint_fetches.fetch_add(1, Ordering::SeqCst);
        let docs = self.endpoint_docs.lock().expect("lock");
        docs.get(&format!("{group_base}/{api_base}/{version}"))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("{group_base}/{api_base}/{version}")))
    }

    async fn send_report(&self, report: &Report) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Status(502));
        }
        self.reports.lock().expect("lock").push(report.clone());
        Ok(())
    }
}
