// quality-gate-agent/src/aggregator.rs
// ============================================================================
// Module: Result Aggregator
// Description: Grouping of validation results and the reporting loop.
// Purpose: Build and submit summary reports on time and count triggers.
// Dependencies: quality-gate-core, quality-gate-transport, tokio
// ============================================================================

//! ## Overview
//! The aggregator owns the aggregation table: results grouped by transmitter
//! and server, preserving enqueue order within each pair. A flush atomically
//! swaps the table for an empty one, snapshots metrics and catalog status,
//! and builds one report per transmitter. Reports are a rolling
//! observability signal, not a ledger: a failed submission abandons the
//! flush and the next window reports new data only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use quality_gate_core::ApplicationConfiguration;
use quality_gate_core::ApplicationMetrics;
use quality_gate_core::ConfigurationUpdateError;
use quality_gate_core::ConfigurationUpdateStatus;
use quality_gate_core::MessageResult;
use quality_gate_core::MetricObject;
use quality_gate_core::Report;
use quality_gate_core::UnsupportedEndpoint;
use quality_gate_core::fold_server_summaries;
use quality_gate_transport::ReportTransport;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::catalog::CatalogHandle;
use crate::catalog::CatalogStatus;
use crate::metrics::Metrics;
use crate::metrics::SystemMetricsSnapshot;
use crate::shutdown::ShutdownSignal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Interval of the count-trigger check.
const COUNT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Report window applied in the DEBUG environment.
const DEBUG_WINDOW_MINUTES: u32 = 2;
/// Version label recorded when a request supplies none.
const NO_VERSION_LABEL: &str = "N.A.";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Static configuration of the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Organisation identifier of this agent.
    pub organisation_id: String,
    /// Process-unique application identifier.
    pub application_id: String,
    /// Application mode label, TRANSMITTER or RECEIVER.
    pub application_mode: String,
    /// Environment label of the deployment.
    pub environment: String,
    /// Local report window override in minutes; zero uses the catalog value.
    pub report_window_override: u32,
    /// Local count-trigger override; zero uses the catalog value.
    pub report_number_override: u32,
}

impl AggregatorConfig {
    /// Returns true when the DEBUG cadence applies.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.environment == "DEBUG"
    }
}

// ============================================================================
// SECTION: Aggregator
// ============================================================================

/// Aggregation table and counters guarded by one mutex.
struct AggregationState {
    /// Results grouped by transmitter, then by server.
    grouped: BTreeMap<String, BTreeMap<String, Vec<MessageResult>>>,
    /// Results appended since the last flush.
    total_results: u64,
    /// Start moment of the current reporting window.
    report_start: DateTime<Utc>,
}

/// Result aggregator and reporting loop.
pub struct Aggregator {
    /// Static configuration.
    config: AggregatorConfig,
    /// Shared catalog for cadence and status snapshots.
    catalog: CatalogHandle,
    /// Transport used for report submission.
    transport: Arc<dyn ReportTransport>,
    /// Agent metrics drained at flush time.
    metrics: Arc<Metrics>,
    /// Aggregation table; held only for O(1) appends and the flush swap.
    state: Mutex<AggregationState>,
}

impl Aggregator {
    /// Creates an aggregator over the shared services.
    #[must_use]
    pub fn new(
        config: AggregatorConfig,
        catalog: CatalogHandle,
        transport: Arc<dyn ReportTransport>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            catalog,
            transport,
            metrics,
            state: Mutex::new(AggregationState {
                grouped: BTreeMap::new(),
                total_results: 0,
                report_start: Utc::now(),
            }),
        }
    }

    /// Appends one result to the aggregation table.
    ///
    /// The transmitter key defaults to the agent's own organisation when the
    /// message carried none.
    pub fn append(&self, result: MessageResult) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.total_results += 1;
        let transmitter = result
            .transmitter_id
            .clone()
            .unwrap_or_else(|| self.config.organisation_id.clone());
        let server_id = result.server_id.clone();
        state
            .grouped
            .entry(transmitter)
            .or_default()
            .entry(server_id)
            .or_default()
            .push(result);
    }

    /// Returns the number of results appended since the last flush.
    #[must_use]
    pub fn pending_results(&self) -> u64 {
        self.state.lock().map_or(0, |state| state.total_results)
    }

    /// Returns true when the aggregation table holds no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().map_or(true, |state| {
            state.grouped.values().all(|servers| servers.values().all(Vec::is_empty))
        })
    }

    /// Runs the reporting loop until shutdown, flushing once more on exit.
    pub async fn run(self: Arc<Self>, mut signal: ShutdownSignal) {
        self.seed_own_transmitter();
        // Initial empty report so dashboards see the agent is alive.
        self.flush().await;

        let window = self.effective_window();
        info!(window_minutes = window.as_secs() / 60, "starting result aggregator");
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + window, window);
        let mut count_check = tokio::time::interval_at(
            tokio::time::Instant::now() + COUNT_CHECK_INTERVAL,
            COUNT_CHECK_INTERVAL,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = count_check.tick() => {
                    if self.count_trigger_reached() {
                        self.flush().await;
                        let window = self.effective_window();
                        ticker = tokio::time::interval_at(
                            tokio::time::Instant::now() + window,
                            window,
                        );
                    }
                }
                () = signal.triggered() => {
                    self.flush().await;
                    break;
                }
            }
        }
    }

    /// Builds and submits one report per transmitter, clearing the table.
    pub async fn flush(&self) {
        info!("processing and sending results");
        let build_started = Instant::now();
        let (grouped, report_start) = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            debug!(total_results = state.total_results, "results found for flush");
            state.total_results = 0;
            let report_start = mem::replace(&mut state.report_start, Utc::now());
            (mem::take(&mut state.grouped), report_start)
        };

        let system = self.metrics.snapshot_and_clear();
        let unsupported = unsupported_entries(self.metrics.take_unsupported_endpoints());
        let (catalog_version, status) = self.catalog.status_snapshot();

        for (transmitter, servers) in &grouped {
            let report = self.build_report(
                transmitter,
                servers,
                &system,
                unsupported.clone(),
                &catalog_version,
                &status,
                report_start,
                build_started,
            );
            if let Err(err) = self.transport.send_report(&report).await {
                error!(error = %err, "error sending report, abandoning flush");
                return;
            }
            if let Ok(rendered) = serde_json::to_string(&report) {
                debug!(report = %rendered, "report submitted");
            }
        }
    }

    /// Ensures the agent's own organisation appears in the first report.
    fn seed_own_transmitter(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.grouped.entry(self.config.organisation_id.clone()).or_default();
        }
    }

    /// Returns true when the count trigger threshold has been reached.
    fn count_trigger_reached(&self) -> bool {
        let threshold = self.effective_send_number();
        threshold > 0 && self.pending_results() >= u64::from(threshold)
    }

    /// Returns the effective reporting window.
    fn effective_window(&self) -> Duration {
        let minutes = if self.config.report_window_override > 0 {
            self.config.report_window_override
        } else if self.config.is_debug() {
            DEBUG_WINDOW_MINUTES
        } else {
            let (window, _) = self.catalog.report_settings();
            window.max(1)
        };
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Returns the effective count-trigger threshold; zero disables it.
    fn effective_send_number(&self) -> u32 {
        if self.config.report_number_override > 0 {
            self.config.report_number_override
        } else {
            let (_, number) = self.catalog.report_settings();
            number
        }
    }

    /// Builds the report for one transmitter snapshot.
    #[allow(clippy::too_many_arguments, reason = "flush snapshots feed one report")]
    fn build_report(
        &self,
        transmitter: &str,
        servers: &BTreeMap<String, Vec<MessageResult>>,
        system: &SystemMetricsSnapshot,
        unsupported_endpoints: Vec<UnsupportedEndpoint>,
        catalog_version: &str,
        status: &CatalogStatus,
        report_start: DateTime<Utc>,
        build_started: Instant,
    ) -> Report {
        let values = vec![
            metric("runtime.ReportStartDate", report_start.to_rfc3339()),
            metric("runtime.ReportEndDate", Utc::now().to_rfc3339()),
            metric("runtime.BadRequestErrors", system.bad_requests_received.clone()),
            metric("runtime.TotalRequests", system.requests_received.clone()),
            metric("runtime.MemoryUsageAvg", system.average_memory.clone()),
            metric("runtime.MemoryUsageMax", system.max_used_memory.clone()),
            metric("runtime.CPUNumber", system.allowed_cpus.clone()),
            metric("runtime.ResponseTimeAvg", system.average_response_time.clone()),
            metric("runtime.ReportGenerationTime", format!("{:?}", build_started.elapsed())),
        ];

        Report {
            metrics: ApplicationMetrics {
                values,
            },
            application_configuration: ApplicationConfiguration {
                application_version: env!("CARGO_PKG_VERSION").to_string(),
                environment: self.config.environment.clone(),
                update_status: ConfigurationUpdateStatus {
                    configuration_version: catalog_version.to_string(),
                    last_execution_date: status.last_execution_date,
                    last_updated_date: status.last_updated_date,
                    update_errors: status
                        .update_messages
                        .iter()
                        .map(|(moment, message)| ConfigurationUpdateError {
                            error_date: *moment,
                            error_message: message.clone(),
                        })
                        .collect(),
                },
                report_execution_window: (self.effective_window().as_secs() / 60).to_string(),
                report_execution_number: self.effective_send_number().to_string(),
                application_mode: self.config.application_mode.clone(),
                application_id: self.config.application_id.clone(),
            },
            client_id: transmitter.to_string(),
            data_owner_id: self.config.organisation_id.clone(),
            unsupported_endpoints,
            server_summary: fold_server_summaries(servers),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds one metric object.
fn metric(key: &str, value: String) -> MetricObject {
    MetricObject {
        key: key.to_string(),
        value,
    }
}

/// Converts drained unsupported endpoint counts into report entries.
fn unsupported_entries(
    drained: BTreeMap<String, BTreeMap<String, u64>>,
) -> Vec<UnsupportedEndpoint> {
    let mut entries = Vec::new();
    for (endpoint, versions) in drained {
        for (version, count) in versions {
            let error = if version == NO_VERSION_LABEL {
                "Endpoint not supported".to_string()
            } else {
                "Version not supported".to_string()
            };
            entries.push(UnsupportedEndpoint {
                endpoint_name: endpoint.clone(),
                version,
                count,
                error,
            });
        }
    }
    entries
}
