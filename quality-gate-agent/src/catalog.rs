// quality-gate-agent/src/catalog.rs
// ============================================================================
// Module: Catalog Store and Control Loop
// Description: Shared catalog state with periodic refresh and hot swap.
// Purpose: Keep endpoint settings current without stalling ingestion.
// Dependencies: quality-gate-core, quality-gate-transport, tokio
// ============================================================================

//! ## Overview
//! [`CatalogHandle`] is the shared-read view of the endpoint catalog used by
//! the API server, the worker, and the aggregator. [`ConfigController`] is
//! its only writer: it fetches the catalog periodically, fetches endpoint
//! documents for changed `(group, api)` pairs while carrying unchanged lists
//! forward by reference, and swaps the whole catalog atomically under the
//! write lock. A reader never observes a mixture of two catalog versions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use quality_gate_core::ConfigurationSettings;
use quality_gate_core::EndpointResolution;
use quality_gate_core::EndpointSetting;
use quality_gate_core::SecuritySettings;
use quality_gate_core::Throughput;
use quality_gate_transport::ReportTransport;
use quality_gate_transport::TransportError;
use thiserror::Error;
use tracing::error;
use tracing::info;

use crate::shutdown::ShutdownSignal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attribute appended to the mask set on every catalog swap.
const ALWAYS_MASKED_ATTRIBUTE: &str = "companyCnpj";
/// Control loop period in the DEBUG environment.
const DEBUG_UPDATE_PERIOD: Duration = Duration::from_secs(2 * 60);
/// Control loop period outside DEBUG.
const UPDATE_PERIOD: Duration = Duration::from_secs(4 * 60 * 60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the configuration control loop.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Catalog or endpoint fetch failed.
    #[error("configuration fetch failed: {0}")]
    Fetch(#[from] TransportError),
}

// ============================================================================
// SECTION: Catalog State
// ============================================================================

/// Status of the configuration update process.
#[derive(Debug, Clone, Default)]
pub struct CatalogStatus {
    /// Moment of the most recent update attempt.
    pub last_execution_date: Option<DateTime<Utc>>,
    /// Moment of the most recent successful update.
    pub last_updated_date: Option<DateTime<Utc>>,
    /// Timestamped errors accumulated since the last successful update.
    pub update_messages: Vec<(DateTime<Utc>, String)>,
}

/// Catalog state guarded by the reader-writer lock.
#[derive(Default)]
struct CatalogState {
    /// Catalog in force; meaningful once `initialized` is set.
    settings: ConfigurationSettings,
    /// Update process status.
    status: CatalogStatus,
    /// Whether an initial catalog has been installed.
    initialized: bool,
}

/// Endpoint lists reusable across catalog swaps, keyed by `(group, api)`.
type CarryForwardLists = BTreeMap<(String, String), (String, Arc<Vec<EndpointSetting>>)>;

/// Shared-read handle over the catalog.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    /// Reader-writer lock over the catalog state.
    state: Arc<RwLock<CatalogState>>,
}

impl CatalogHandle {
    /// Creates an empty, uninitialized catalog handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle preloaded with a catalog, for tests and tools.
    #[must_use]
    pub fn with_settings(settings: ConfigurationSettings) -> Self {
        let handle = Self::new();
        if let Ok(mut state) = handle.state.write() {
            state.settings = settings;
            state.initialized = true;
        }
        handle
    }

    /// Resolves an endpoint name against the current catalog.
    #[must_use]
    pub fn resolve_endpoint(&self, endpoint_name: &str) -> Option<EndpointResolution> {
        let state = self.state.read().ok()?;
        state.settings.resolve_endpoint(endpoint_name)
    }

    /// Returns the sampling rate for a throughput class.
    ///
    /// An unreadable catalog admits nothing.
    #[must_use]
    pub fn validation_rate(&self, throughput: Throughput) -> u8 {
        self.state.read().map_or(0, |state| state.settings.validation_rate(throughput))
    }

    /// Returns the version label of the catalog in force.
    #[must_use]
    pub fn version(&self) -> String {
        self.state.read().map_or_else(|_| String::new(), |state| state.settings.version.clone())
    }

    /// Returns the masking attribute set of the catalog in force.
    #[must_use]
    pub fn security_settings(&self) -> SecuritySettings {
        self.state
            .read()
            .map_or_else(|_| SecuritySettings::default(), |state| state.settings.security.clone())
    }

    /// Returns the catalog-supplied report window and count trigger.
    #[must_use]
    pub fn report_settings(&self) -> (u32, u32) {
        self.state.read().map_or((0, 0), |state| {
            (state.settings.report.execution_window, state.settings.report.send_on_number)
        })
    }

    /// Returns the catalog version together with the update status.
    #[must_use]
    pub fn status_snapshot(&self) -> (String, CatalogStatus) {
        self.state.read().map_or_else(
            |_| (String::new(), CatalogStatus::default()),
            |state| (state.settings.version.clone(), state.status.clone()),
        )
    }

    /// Records the start of an update attempt.
    fn mark_execution(&self, moment: DateTime<Utc>) {
        if let Ok(mut state) = self.state.write() {
            state.status.last_execution_date = Some(moment);
        }
    }

    /// Appends a timestamped update failure message.
    fn record_update_error(&self, message: String) {
        if let Ok(mut state) = self.state.write() {
            state.status.update_messages.push((Utc::now(), message));
        }
    }

    /// Returns the current version when a catalog is installed.
    fn installed_version(&self) -> Option<String> {
        let state = self.state.read().ok()?;
        state.initialized.then(|| state.settings.version.clone())
    }

    /// Collects endpoint lists reusable from the installed catalog.
    ///
    /// The key is `(group, api)` and the value pairs the API version with the
    /// shared endpoint list.
    fn carry_forward_lists(&self) -> CarryForwardLists {
        let mut lists = BTreeMap::new();
        let Ok(state) = self.state.read() else {
            return lists;
        };
        if !state.initialized {
            return lists;
        }
        for group in &state.settings.validation.api_groups {
            for api in &group.api_list {
                lists.insert(
                    (group.group.clone(), api.name.clone()),
                    (api.version.clone(), Arc::clone(&api.endpoints)),
                );
            }
        }
        lists
    }

    /// Installs a new catalog atomically.
    fn install(&self, mut settings: ConfigurationSettings) {
        if let Ok(mut state) = self.state.write() {
            settings.security.attributes_to_mask.push(ALWAYS_MASKED_ATTRIBUTE.to_string());
            state.settings = settings;
            state.status.last_updated_date = state.status.last_execution_date;
            state.status.update_messages.clear();
            state.initialized = true;
        }
    }
}

// ============================================================================
// SECTION: Config Controller
// ============================================================================

/// Periodic fetch-diff-swap controller for the catalog.
pub struct ConfigController {
    /// Catalog written by this controller.
    catalog: CatalogHandle,
    /// Transport to the central server.
    transport: Arc<dyn ReportTransport>,
    /// Whether the short DEBUG refresh period applies.
    debug_mode: bool,
}

impl ConfigController {
    /// Creates a controller for the given catalog and transport.
    #[must_use]
    pub fn new(
        catalog: CatalogHandle,
        transport: Arc<dyn ReportTransport>,
        debug_mode: bool,
    ) -> Self {
        Self {
            catalog,
            transport,
            debug_mode,
        }
    }

    /// Performs the initial catalog load.
    ///
    /// The process cannot run without a starting catalog, so the caller must
    /// treat a failure as fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when the catalog or an endpoint document
    /// cannot be fetched.
    pub async fn initialize(&self) -> Result<(), ControllerError> {
        self.update_configuration().await
    }

    /// Runs the periodic update loop until shutdown.
    pub async fn run(self, mut signal: ShutdownSignal) {
        let period = if self.debug_mode { DEBUG_UPDATE_PERIOD } else { UPDATE_PERIOD };
        info!(period_secs = period.as_secs(), "starting configuration update process");
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.update_configuration().await {
                        error!(error = %err, "error updating configuration");
                    }
                }
                () = signal.triggered() => break,
            }
        }
    }

    /// Fetches, diffs, and installs the catalog when its version changed.
    async fn update_configuration(&self) -> Result<(), ControllerError> {
        info!("executing configuration update");
        self.catalog.mark_execution(Utc::now());

        let mut fetched = match self.transport.fetch_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                self.catalog.record_update_error(err.to_string());
                return Err(err.into());
            }
        };

        if let Some(version) = self.catalog.installed_version() {
            if version == fetched.version {
                info!(%version, "same configuration version was found");
                return Ok(());
            }
        }

        if let Err(err) = self.build_endpoint_lists(&mut fetched).await {
            self.catalog.record_update_error(err.to_string());
            return Err(err.into());
        }

        let version = fetched.version.clone();
        self.catalog.install(fetched);
        info!(%version, "configuration was updated to the latest version");
        Ok(())
    }

    /// Fills endpoint lists, refetching only changed `(group, api)` pairs.
    async fn build_endpoint_lists(
        &self,
        settings: &mut ConfigurationSettings,
    ) -> Result<(), TransportError> {
        let reusable = self.catalog.carry_forward_lists();
        for group in &mut settings.validation.api_groups {
            for api in &mut group.api_list {
                let key = (group.group.clone(), api.name.clone());
                if let Some((version, endpoints)) = reusable.get(&key) {
                    if *version == api.version {
                        api.endpoints = Arc::clone(endpoints);
                        continue;
                    }
                }
                info!(group = %group.group, api = %api.name, "loading api endpoint settings");
                let endpoints = self
                    .transport
                    .fetch_endpoints(&group.base_path, &api.base_path, &api.version)
                    .await?;
                api.endpoints = Arc::new(endpoints);
            }
        }
        Ok(())
    }
}
