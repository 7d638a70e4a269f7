// quality-gate-cli/src/main.rs
// ============================================================================
// Module: Quality Gate Entrypoint
// Description: Process wiring for the data-quality telemetry agent.
// Purpose: Load settings, bootstrap the catalog, and run the services.
// Dependencies: quality-gate-agent, quality-gate-config, tokio
// ============================================================================

//! ## Overview
//! The binary loads settings, performs the fatal initial catalog fetch, and
//! starts the long-lived services: worker, aggregator, evidence store,
//! configuration controller, metrics sampler, and the ingestion server.
//! `SIGINT`/`SIGTERM` trigger the shutdown signal; the server drains
//! in-flight requests, the worker drains the queue, and the aggregator and
//! evidence store flush once before the process exits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use quality_gate_agent::Aggregator;
use quality_gate_agent::AggregatorConfig;
use quality_gate_agent::ApiServer;
use quality_gate_agent::CatalogHandle;
use quality_gate_agent::ConfigController;
use quality_gate_agent::ControllerError;
use quality_gate_agent::EvidenceStore;
use quality_gate_agent::Metrics;
use quality_gate_agent::MetricsError;
use quality_gate_agent::QueueManager;
use quality_gate_agent::ServerError;
use quality_gate_agent::Shutdown;
use quality_gate_agent::Worker;
use quality_gate_config::Settings;
use quality_gate_config::SettingsError;
use quality_gate_transport::ReportServerClient;
use quality_gate_transport::ReportTransport;
use quality_gate_transport::TransportError;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal startup and runtime errors of the agent process.
#[derive(Debug, Error)]
enum AgentError {
    /// Settings could not be loaded or validated.
    #[error("settings failure: {0}")]
    Settings(#[from] SettingsError),
    /// Central server client could not be constructed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// Initial catalog load failed.
    #[error("initial configuration load failed: {0}")]
    Bootstrap(#[from] ControllerError),
    /// Metrics registration failed.
    #[error("metrics failure: {0}")]
    Metrics(#[from] MetricsError),
    /// Ingestion server failed.
    #[error("server failure: {0}")]
    Server(#[from] ServerError),
}

// ============================================================================
// SECTION: Entrypoint
// ============================================================================

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal error");
            eprintln!("quality-gate: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Wires and runs the agent until shutdown.
async fn run() -> Result<(), AgentError> {
    let settings = Settings::load()?;
    init_tracing(&settings.logging.level);
    let mode = settings.application.mode.map(|mode| mode.to_string()).unwrap_or_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = %mode,
        environment = %settings.server.environment,
        "starting quality gate agent"
    );

    let transport: Arc<dyn ReportTransport> = Arc::new(ReportServerClient::new(
        settings.security.server_url.clone(),
        settings.application.organisation_id.clone(),
    )?);

    let catalog = CatalogHandle::new();
    let controller =
        ConfigController::new(catalog.clone(), Arc::clone(&transport), settings.server.is_debug());
    controller.initialize().await?;

    let metrics = Arc::new(Metrics::new()?);
    let (queue, queue_rx) = QueueManager::new();
    let aggregator = Arc::new(Aggregator::new(
        AggregatorConfig {
            organisation_id: settings.application.organisation_id.clone(),
            application_id: settings.application_id.to_string(),
            application_mode: mode,
            environment: settings.server.environment.clone(),
            report_window_override: settings.report.execution_window,
            report_number_override: settings.report.execution_number,
        },
        catalog.clone(),
        Arc::clone(&transport),
        Arc::clone(&metrics),
    ));
    let evidence = Arc::new(EvidenceStore::new(
        settings.result.clone(),
        settings.application_id.to_string(),
        catalog.clone(),
    ));
    let worker = Worker::new(
        catalog.clone(),
        Arc::clone(&aggregator),
        Arc::clone(&evidence),
        Arc::clone(&metrics),
    );

    let (shutdown, signal) = Shutdown::new();
    spawn_signal_watcher(shutdown);

    let worker_handle = tokio::spawn(worker.run(queue_rx));
    tokio::spawn(controller.run(signal.clone()));
    let aggregator_handle = tokio::spawn(Arc::clone(&aggregator).run(signal.clone()));
    let store_handle = tokio::spawn(Arc::clone(&evidence).run_store_loop(signal.clone()));
    tokio::spawn(Arc::clone(&evidence).run_cleanup_loop(signal.clone()));
    tokio::spawn(Arc::clone(&metrics).run_memory_sampler(signal.clone()));

    let mut server =
        ApiServer::new(catalog, queue, Arc::clone(&metrics), settings.server.port);
    if settings.security.enable_https {
        server = server.with_tls(settings.security.cert_file(), settings.security.key_file());
    }
    server.serve(signal).await?;

    // The server dropped the last queue handle; the worker drains and the
    // flushing loops finish before the process exits.
    let _ = worker_handle.await;
    let _ = aggregator_handle.await;
    let _ = store_handle.await;
    info!("quality gate agent stopped");
    Ok(())
}

/// Initializes the tracing subscriber with the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Triggers shutdown on SIGINT or SIGTERM.
fn spawn_signal_watcher(shutdown: Shutdown) {
    tokio::spawn(async move {
        let interrupt = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(terminate) => terminate,
                Err(err) => {
                    error!(error = %err, "failed to install terminate handler");
                    let _ = interrupt.await;
                    info!("shutdown signal received");
                    shutdown.trigger();
                    return;
                }
            };
            tokio::select! {
                _ = interrupt => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = interrupt.await;
        }
        info!("shutdown signal received");
        shutdown.trigger();
    });
}
