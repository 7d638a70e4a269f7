// quality-gate-agent/src/metrics.rs
// ============================================================================
// Module: Agent Metrics
// Description: Prometheus counters and internal snapshot metrics.
// Purpose: Observe ingestion and validation, and feed report snapshots.
// Dependencies: prometheus, tokio
// ============================================================================

//! ## Overview
//! Two metric families coexist: Prometheus counters exported on `/metrics`,
//! which are never reset, and internal snapshot buffers (request counters,
//! unsupported endpoints, per-minute resident-memory samples, response
//! times) which the aggregator drains once per flush through
//! [`Metrics::snapshot_and_clear`]. A background task samples process memory
//! every minute.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use thiserror::Error;

use crate::shutdown::ShutdownSignal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Interval between resident-memory samples.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric failed to register.
    #[error("metric registration failed: {0}")]
    Registration(#[from] prometheus::Error),
    /// Exposition encoding failed.
    #[error("metric encoding failed: {0}")]
    Encoding(String),
}

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// One resident-memory observation.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    /// Resident set size in bytes.
    pub resident_bytes: u64,
    /// Peak resident set size in bytes.
    pub peak_bytes: u64,
}

/// System metrics drained once per report flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemMetricsSnapshot {
    /// Average resident memory, rendered in megabytes.
    pub average_memory: String,
    /// Peak resident memory, rendered in megabytes.
    pub max_used_memory: String,
    /// CPU usage; empty until a collection source is wired in.
    pub cpu_usage: String,
    /// Number of CPUs available to the process.
    pub allowed_cpus: String,
    /// Requests received since the previous snapshot.
    pub requests_received: String,
    /// Bad requests received since the previous snapshot.
    pub bad_requests_received: String,
    /// Average response time in microseconds since the previous snapshot.
    pub average_response_time: String,
}

/// Internal counters and buffers cleared on snapshot.
#[derive(Default)]
struct InternalCounters {
    /// Requests received since the previous snapshot.
    requests_received: u64,
    /// Bad requests received since the previous snapshot.
    bad_requests_received: u64,
    /// Unsupported endpoint observations by endpoint and version.
    unsupported_endpoints: BTreeMap<String, BTreeMap<String, u64>>,
    /// Resident-memory samples for the current window.
    measurements: Vec<MemorySample>,
    /// Response durations in microseconds for the current window.
    response_times_us: Vec<i64>,
}

// ============================================================================
// SECTION: Metrics Registry
// ============================================================================

/// Agent metrics facade.
pub struct Metrics {
    /// Prometheus registry backing `/metrics`.
    registry: Registry,
    /// Incoming request counter.
    request_count: IntCounter,
    /// Dropped-on-full-queue counter.
    queue_full: IntCounter,
    /// Validated requests by server and endpoint.
    endpoint_requests: IntCounterVec,
    /// Validation failures by server and endpoint.
    endpoint_validation_errors: IntCounterVec,
    /// Internal snapshot state.
    inner: Mutex<InternalCounters>,
}

impl Metrics {
    /// Creates and registers the agent metrics.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] when a metric fails to register.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let request_count = IntCounter::new("request_count", "Incoming request count")?;
        registry.register(Box::new(request_count.clone()))?;

        let queue_full =
            IntCounter::new("queue_full", "Messages dropped because the queue was full")?;
        registry.register(Box::new(queue_full.clone()))?;

        let endpoint_requests = IntCounterVec::new(
            Opts::new("endpoint_requests", "Endpoint requests by server"),
            &["server", "endpoint"],
        )?;
        registry.register(Box::new(endpoint_requests.clone()))?;

        let endpoint_validation_errors = IntCounterVec::new(
            Opts::new("endpoint_validation_errors", "Endpoint validation errors by server"),
            &["server", "endpoint"],
        )?;
        registry.register(Box::new(endpoint_validation_errors.clone()))?;

        Ok(Self {
            registry,
            request_count,
            queue_full,
            endpoint_requests,
            endpoint_validation_errors,
            inner: Mutex::new(InternalCounters::default()),
        })
    }

    /// Counts one received request.
    pub fn increase_requests_received(&self) {
        self.request_count.inc();
        if let Ok(mut inner) = self.inner.lock() {
            inner.requests_received += 1;
        }
    }

    /// Counts one rejected request.
    pub fn increase_bad_requests_received(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bad_requests_received += 1;
        }
    }

    /// Counts one message dropped because the queue was full.
    pub fn increase_queue_full(&self) {
        self.queue_full.inc();
    }

    /// Records an unsupported endpoint/version observation.
    ///
    /// Also counts the request as a bad request.
    pub fn record_unsupported_endpoint(&self, endpoint: &str, version: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bad_requests_received += 1;
            *inner
                .unsupported_endpoints
                .entry(endpoint.to_string())
                .or_default()
                .entry(version.to_string())
                .or_default() += 1;
        }
    }

    /// Records a validation outcome for a server/endpoint pair.
    pub fn observe_validation(&self, server_id: &str, endpoint: &str, valid: bool) {
        self.endpoint_requests.with_label_values(&[server_id, endpoint]).inc();
        if !valid {
            self.endpoint_validation_errors.with_label_values(&[server_id, endpoint]).inc();
        }
    }

    /// Records the response duration of one handled request.
    pub fn record_response_duration(&self, started: Instant) {
        let elapsed_us = i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX);
        if let Ok(mut inner) = self.inner.lock() {
            inner.response_times_us.push(elapsed_us);
        }
    }

    /// Appends one resident-memory sample to the snapshot buffer.
    pub fn record_memory_sample(&self, sample: MemorySample) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.measurements.push(sample);
        }
    }

    /// Drains the internal snapshot counters.
    ///
    /// The exported Prometheus counters are left untouched; only the
    /// snapshot buffers are zeroed.
    pub fn snapshot_and_clear(&self) -> SystemMetricsSnapshot {
        let Ok(mut inner) = self.inner.lock() else {
            return SystemMetricsSnapshot::default();
        };
        let (average, peak) = summarize_memory(&inner.measurements);
        let average_response = average_duration_us(&inner.response_times_us);
        let cpus = thread::available_parallelism().map_or(0, std::num::NonZeroUsize::get);

        let snapshot = SystemMetricsSnapshot {
            average_memory: format!("{:.2} MB", to_megabytes(average)),
            max_used_memory: format!("{:.2} MB", to_megabytes(peak)),
            // TODO: wire a CPU usage source; /proc/self/stat needs a second
            // observation point to turn jiffies into a percentage.
            cpu_usage: String::new(),
            allowed_cpus: cpus.to_string(),
            requests_received: inner.requests_received.to_string(),
            bad_requests_received: inner.bad_requests_received.to_string(),
            average_response_time: average_response.to_string(),
        };

        inner.requests_received = 0;
        inner.bad_requests_received = 0;
        inner.measurements.clear();
        inner.response_times_us.clear();
        snapshot
    }

    /// Drains the unsupported endpoint observations.
    pub fn take_unsupported_endpoints(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.inner
            .lock()
            .map(|mut inner| std::mem::take(&mut inner.unsupported_endpoints))
            .unwrap_or_default()
    }

    /// Renders the Prometheus text exposition.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] when encoding fails.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|err| MetricsError::Encoding(err.to_string()))?;
        String::from_utf8(buffer).map_err(|err| MetricsError::Encoding(err.to_string()))
    }

    /// Samples process memory every minute until shutdown.
    pub async fn run_memory_sampler(self: std::sync::Arc<Self>, mut signal: ShutdownSignal) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + MEMORY_SAMPLE_INTERVAL,
            MEMORY_SAMPLE_INTERVAL,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(sample) = read_memory_sample() {
                        self.record_memory_sample(sample);
                    }
                }
                () = signal.triggered() => break,
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Averages the sampled resident memory and returns the observed peak.
fn summarize_memory(samples: &[MemorySample]) -> (u64, u64) {
    if samples.is_empty() {
        return (0, 0);
    }
    let sum: u64 = samples.iter().map(|sample| sample.resident_bytes).sum();
    let peak = samples.iter().map(|sample| sample.peak_bytes).max().unwrap_or(0);
    (sum / samples.len() as u64, peak)
}

/// Averages response durations in microseconds.
fn average_duration_us(durations: &[i64]) -> i64 {
    if durations.is_empty() {
        return 0;
    }
    let sum: i64 = durations.iter().sum();
    sum / durations.len() as i64
}

/// Converts bytes to megabytes.
fn to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Reads resident and peak memory from the process status file.
fn read_memory_sample() -> Option<MemorySample> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let mut resident = None;
    let mut peak = None;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            resident = parse_kib(rest);
        } else if let Some(rest) = line.strip_prefix("VmHWM:") {
            peak = parse_kib(rest);
        }
    }
    Some(MemorySample {
        resident_bytes: resident?,
        peak_bytes: peak?,
    })
}

/// Parses a `/proc` memory line value given in kibibytes.
fn parse_kib(rest: &str) -> Option<u64> {
    rest.trim().split_whitespace().next()?.parse::<u64>().ok().map(|kib| kib * 1024)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
