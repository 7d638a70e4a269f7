// quality-gate-agent/tests/aggregator.rs
// ============================================================================
// Module: Aggregator Tests
// Description: Grouping, flush semantics, and reporting triggers.
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quality_gate_agent::Aggregator;
use quality_gate_agent::AggregatorConfig;
use quality_gate_agent::CatalogHandle;
use quality_gate_agent::Metrics;
use quality_gate_agent::Shutdown;
use quality_gate_core::MessageResult;

mod common;

use common::ORG_ID;
use common::SERVER_ID;
use common::StubTransport;
use common::accounts_catalog;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config() -> AggregatorConfig {
    AggregatorConfig {
        organisation_id: ORG_ID.to_string(),
        application_id: "app-1".to_string(),
        application_mode: "TRANSMITTER".to_string(),
        environment: "PRODUCTION".to_string(),
        report_window_override: 0,
        report_number_override: 0,
    }
}

fn result(transmitter: Option<&str>, valid: bool) -> MessageResult {
    let mut errors = BTreeMap::new();
    if !valid {
        errors.insert("a".to_string(), vec!["(root): a is required".to_string()]);
    }
    MessageResult {
        endpoint: "/accounts/v2/accounts".to_string(),
        http_method: "POST".to_string(),
        server_id: SERVER_ID.to_string(),
        transmitter_id: transmitter.map(str::to_string),
        x_fapi_interaction_id: "x1".to_string(),
        valid,
        errors,
    }
}

fn build_aggregator(transport: &Arc<StubTransport>) -> Arc<Aggregator> {
    let catalog = CatalogHandle::with_settings(accounts_catalog("v1"));
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    Arc::new(Aggregator::new(config(), catalog, Arc::clone(transport) as Arc<dyn quality_gate_transport::ReportTransport>, metrics))
}

// ============================================================================
// SECTION: Append Semantics
// ============================================================================

#[tokio::test]
async fn append_defaults_transmitter_to_own_organisation() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);

    aggregator.append(result(None, true));
    aggregator.append(result(Some("other-org"), true));
    assert_eq!(aggregator.pending_results(), 2);

    aggregator.flush().await;
    let reports = transport.submitted_reports();
    assert_eq!(reports.len(), 2);
    let clients: Vec<&str> = reports.iter().map(|report| report.client_id.as_str()).collect();
    assert!(clients.contains(&ORG_ID));
    assert!(clients.contains(&"other-org"));
    for report in &reports {
        assert_eq!(report.data_owner_id, ORG_ID);
    }
}

// ============================================================================
// SECTION: Flush Semantics
// ============================================================================

#[tokio::test]
async fn flush_clears_table_and_counter() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);

    aggregator.append(result(None, true));
    aggregator.append(result(None, false));
    assert_eq!(aggregator.pending_results(), 2);

    aggregator.flush().await;
    assert_eq!(aggregator.pending_results(), 0);
    assert!(aggregator.is_empty());
}

#[tokio::test]
async fn flush_folds_results_into_server_summaries() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);

    aggregator.append(result(None, true));
    aggregator.append(result(None, false));
    aggregator.flush().await;

    let reports = transport.submitted_reports();
    assert_eq!(reports.len(), 1);
    let summary = &reports[0].server_summary[0];
    assert_eq!(summary.server_id, SERVER_ID);
    assert_eq!(summary.total_requests, 2);
    let endpoint = &summary.endpoint_summary[0];
    assert_eq!(endpoint.total_requests, 2);
    assert_eq!(endpoint.validation_errors, 1);
    assert_eq!(endpoint.detail[0].field, "a");
    assert_eq!(endpoint.detail[0].details[0].error_type, "(root): a is required");
}

#[tokio::test]
async fn flush_attaches_metrics_and_configuration_snapshot() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);

    aggregator.append(result(None, true));
    aggregator.flush().await;

    let report = &transport.submitted_reports()[0];
    let keys: Vec<&str> =
        report.metrics.values.iter().map(|value| value.key.as_str()).collect();
    for expected in [
        "runtime.ReportStartDate",
        "runtime.ReportEndDate",
        "runtime.BadRequestErrors",
        "runtime.TotalRequests",
        "runtime.MemoryUsageAvg",
        "runtime.MemoryUsageMax",
        "runtime.CPUNumber",
        "runtime.ResponseTimeAvg",
        "runtime.ReportGenerationTime",
    ] {
        assert!(keys.contains(&expected), "missing metric {expected}");
    }
    let configuration = &report.application_configuration;
    assert_eq!(configuration.application_mode, "TRANSMITTER");
    assert_eq!(configuration.application_id, "app-1");
    assert_eq!(configuration.update_status.configuration_version, "v1");
    // Window comes from the catalog, count trigger as configured.
    assert_eq!(configuration.report_execution_window, "60");
    assert_eq!(configuration.report_execution_number, "100000");
}

#[tokio::test]
async fn failed_submission_abandons_the_flush() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);
    transport.fail_send.store(true, Ordering::SeqCst);

    aggregator.append(result(None, true));
    aggregator.flush().await;

    // The flush already swapped the table; the data is not resubmitted.
    assert_eq!(aggregator.pending_results(), 0);
    assert!(transport.submitted_reports().is_empty());

    transport.fail_send.store(false, Ordering::SeqCst);
    aggregator.flush().await;
    assert!(transport.submitted_reports().is_empty());
}

// ============================================================================
// SECTION: Reporting Loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn run_emits_an_initial_report_at_startup() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);
    let (shutdown, signal) = Shutdown::new();

    let handle = tokio::spawn(Arc::clone(&aggregator).run(signal));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let reports = transport.submitted_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].client_id, ORG_ID);
    assert!(reports[0].server_summary.is_empty());

    shutdown.trigger();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn count_trigger_flushes_and_restarts_the_window() {
    let transport = Arc::new(StubTransport::default());
    let catalog = {
        let mut settings = accounts_catalog("v1");
        settings.report.execution_window = 60;
        settings.report.send_on_number = 10_000;
        CatalogHandle::with_settings(settings)
    };
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let aggregator =
        Arc::new(Aggregator::new(config(), catalog, Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, metrics));
    let (shutdown, signal) = Shutdown::new();

    let handle = tokio::spawn(Arc::clone(&aggregator).run(signal));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.submitted_reports().len(), 1, "initial report");

    // Reach the threshold ten minutes into the sixty minute window.
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    for _ in 0..10_001 {
        aggregator.append(result(None, true));
    }
    // The five second count check fires and flushes early.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(transport.submitted_reports().len(), 2, "count-triggered report");
    assert_eq!(aggregator.pending_results(), 0);

    // The window restarted at the count trigger, so nothing flushes at the
    // original sixty minute mark.
    aggregator.append(result(None, true));
    tokio::time::sleep(Duration::from_secs(55 * 60)).await;
    assert_eq!(transport.submitted_reports().len(), 2, "window restarted");

    // The restarted window elapses roughly sixty minutes after the early
    // flush, at about seventy minutes of test time.
    tokio::time::sleep(Duration::from_secs(6 * 60)).await;
    assert_eq!(transport.submitted_reports().len(), 3, "time-triggered report");

    shutdown.trigger();
    handle.await.expect("join");
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_results_once() {
    let transport = Arc::new(StubTransport::default());
    let aggregator = build_aggregator(&transport);
    let (shutdown, signal) = Shutdown::new();

    let handle = tokio::spawn(Arc::clone(&aggregator).run(signal));
    tokio::time::sleep(Duration::from_millis(10)).await;
    aggregator.append(result(None, true));

    shutdown.trigger();
    handle.await.expect("join");

    let reports = transport.submitted_reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].server_summary[0].total_requests, 1);
}
