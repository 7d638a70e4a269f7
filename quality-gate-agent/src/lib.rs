// quality-gate-agent/src/lib.rs
// ============================================================================
// Module: Quality Gate Agent
// Description: Runtime services of the data-quality telemetry agent.
// Purpose: Wire ingestion, validation, aggregation, and evidence retention.
// Dependencies: axum, tokio, prometheus, quality-gate-core
// ============================================================================

//! ## Overview
//! This crate hosts the long-lived services of the agent: the HTTP ingestion
//! server with its sampling gate, the bounded message queue and its single
//! consumer, the aggregation and reporting loop, the evidence store with
//! rotation and retention, the configuration control loop, and the metrics
//! registry. Services are constructed once and passed by handle; every
//! background loop observes the process-wide shutdown signal.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aggregator;
pub mod catalog;
pub mod evidence;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregator::Aggregator;
pub use aggregator::AggregatorConfig;
pub use catalog::CatalogHandle;
pub use catalog::CatalogStatus;
pub use catalog::ConfigController;
pub use catalog::ControllerError;
pub use evidence::EvidenceStore;
pub use metrics::MemorySample;
pub use metrics::Metrics;
pub use metrics::MetricsError;
pub use metrics::SystemMetricsSnapshot;
pub use queue::QUEUE_CAPACITY;
pub use queue::QueueManager;
pub use server::ApiServer;
pub use server::ServerError;
pub use shutdown::Shutdown;
pub use shutdown::ShutdownSignal;
pub use worker::Worker;
