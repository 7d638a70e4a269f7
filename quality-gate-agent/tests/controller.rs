// quality-gate-agent/tests/controller.rs
// ============================================================================
// Module: Config Controller Tests
// Description: Catalog bootstrap, version diffing, and hot swap.
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::Ordering;

use quality_gate_agent::CatalogHandle;
use quality_gate_agent::ConfigController;
use quality_gate_core::EndpointSetting;
use quality_gate_core::Throughput;

mod common;

use common::StubTransport;
use common::accounts_catalog;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn accounts_endpoints() -> Vec<EndpointSetting> {
    vec![EndpointSetting {
        endpoint: "/accounts".to_string(),
        body_schema: r#"{"type":"object"}"#.to_string(),
        throughput: Throughput::High,
    }]
}

/// Catalog document as fetched from the server: no endpoint lists yet.
fn remote_catalog(version: &str) -> quality_gate_core::ConfigurationSettings {
    let mut catalog = accounts_catalog(version);
    for group in &mut catalog.validation.api_groups {
        for api in &mut group.api_list {
            api.endpoints = Arc::new(Vec::new());
        }
    }
    catalog
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[tokio::test]
async fn initialize_loads_catalog_and_endpoints() {
    let transport = Arc::new(StubTransport::default());
    transport.push_settings(remote_catalog("v1"));
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    controller.initialize().await.expect("initialize");

    assert_eq!(catalog.version(), "v1");
    let resolution = catalog.resolve_endpoint("/accounts/v2/accounts").expect("resolved");
    assert_eq!(resolution.endpoint.body_schema, r#"{"type":"object"}"#);
    assert_eq!(transport.endpoint_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn initialize_failure_is_fatal_to_the_caller() {
    let transport = Arc::new(StubTransport::default());
    transport.fail_settings.store(true, Ordering::SeqCst);

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    assert!(controller.initialize().await.is_err());

    let (_, status) = catalog.status_snapshot();
    assert_eq!(status.update_messages.len(), 1);
    assert!(catalog.resolve_endpoint("/accounts/v2/accounts").is_none());
}

// ============================================================================
// SECTION: Version Diffing
// ============================================================================

#[tokio::test]
async fn same_version_is_a_no_op() {
    let transport = Arc::new(StubTransport::default());
    transport.push_settings(remote_catalog("v1"));
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    controller.initialize().await.expect("first load");
    controller.initialize().await.expect("second load");

    // The catalog was fetched twice but the endpoint list only once.
    assert_eq!(transport.settings_fetches.load(Ordering::SeqCst), 2);
    assert_eq!(transport.endpoint_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unchanged_api_version_carries_endpoints_forward() {
    let transport = Arc::new(StubTransport::default());
    transport.push_settings(remote_catalog("v1"));
    transport.push_settings(remote_catalog("v2"));
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    controller.initialize().await.expect("first load");
    controller.initialize().await.expect("second load");

    // Catalog version moved, the unchanged API was not refetched.
    assert_eq!(catalog.version(), "v2");
    assert_eq!(transport.endpoint_fetches.load(Ordering::SeqCst), 1);
    assert!(catalog.resolve_endpoint("/accounts/v2/accounts").is_some());
}

#[tokio::test]
async fn changed_api_version_refetches_endpoints() {
    let transport = Arc::new(StubTransport::default());
    let mut second = remote_catalog("v2");
    second.validation.api_groups[0].api_list[0].version = "3.0.0".to_string();
    transport.push_settings(remote_catalog("v1"));
    transport.push_settings(second);
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());
    transport.set_endpoints(
        "opendata-accounts",
        "accounts",
        "3.0.0",
        vec![EndpointSetting {
            endpoint: "/balances".to_string(),
            body_schema: String::new(),
            throughput: Throughput::Medium,
        }],
    );

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    controller.initialize().await.expect("first load");
    controller.initialize().await.expect("second load");

    assert_eq!(transport.endpoint_fetches.load(Ordering::SeqCst), 2);
    assert!(catalog.resolve_endpoint("/accounts/v2/balances").is_some());
    // The old endpoint list is gone with the old catalog.
    assert!(catalog.resolve_endpoint("/accounts/v2/accounts").is_none());
}

// ============================================================================
// SECTION: Hot Swap Semantics
// ============================================================================

#[tokio::test]
async fn dropped_endpoint_is_unresolvable_after_swap() {
    let transport = Arc::new(StubTransport::default());
    let mut second = remote_catalog("v2");
    second.validation.api_groups[0].api_list[0].version = "2.1.0".to_string();
    transport.push_settings(remote_catalog("v1"));
    transport.push_settings(second);
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());
    // The new API version no longer carries the endpoint.
    transport.set_endpoints("opendata-accounts", "accounts", "2.1.0", Vec::new());

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    controller.initialize().await.expect("first load");
    assert!(catalog.resolve_endpoint("/accounts/v2/accounts").is_some());

    controller.initialize().await.expect("second load");
    assert!(catalog.resolve_endpoint("/accounts/v2/accounts").is_none());
    assert_eq!(catalog.version(), "v2");
}

#[tokio::test]
async fn swap_appends_company_cnpj_to_mask_set_and_clears_messages() {
    let transport = Arc::new(StubTransport::default());
    transport.fail_settings.store(true, Ordering::SeqCst);

    let catalog = CatalogHandle::new();
    let controller = ConfigController::new(catalog.clone(), Arc::clone(&transport) as Arc<dyn quality_gate_transport::ReportTransport>, false);
    assert!(controller.initialize().await.is_err());
    let (_, status) = catalog.status_snapshot();
    assert_eq!(status.update_messages.len(), 1);

    transport.fail_settings.store(false, Ordering::SeqCst);
    transport.push_settings(remote_catalog("v1"));
    transport.set_endpoints("opendata-accounts", "accounts", "2.0.0", accounts_endpoints());
    controller.initialize().await.expect("load");

    let security = catalog.security_settings();
    assert!(security.have_to_mask("companyCnpj"));
    let (version, status) = catalog.status_snapshot();
    assert_eq!(version, "v1");
    assert!(status.update_messages.is_empty());
    assert!(status.last_updated_date.is_some());
    assert_eq!(status.last_updated_date, status.last_execution_date);
}
