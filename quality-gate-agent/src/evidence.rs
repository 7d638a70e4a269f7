// quality-gate-agent/src/evidence.rs
// ============================================================================
// Module: Evidence Store
// Description: Bounded masked failure samples with rotation and retention.
// Purpose: Retain reviewable evidence without accumulating bulk PII.
// Dependencies: quality-gate-core, quality-gate-config, chrono, tokio
// ============================================================================

//! ## Overview
//! The evidence store buffers masked samples of failing payloads, capped per
//! `(group, api, endpoint, field, description)` tuple. A rotation loop swaps
//! the buffer every `24 / files_per_day` hours and writes one file per API
//! bucket under `./data_logs/YYYY-MM-DD/{application_id}/`; a daily cleanup
//! removes date directories older than the retention window. The buffer
//! mutex and the cleanup-date mutex guard disjoint state and stay separate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;
use chrono::NaiveDate;
use quality_gate_config::ResultSettings;
use quality_gate_core::EndpointResolution;
use quality_gate_core::Message;
use quality_gate_core::MessageResult;
use quality_gate_core::scramble_payload;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::error;
use tracing::info;

use crate::catalog::CatalogHandle;
use crate::shutdown::ShutdownSignal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default evidence directory.
const DEFAULT_BASE_PATH: &str = "./data_logs";
/// Date format used for evidence folders.
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Hour-minute format used for evidence file names.
const HOUR_FORMAT: &str = "%H%M";
/// Interval between cleanup-date checks.
const CLEANUP_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// SECTION: Evidence Types
// ============================================================================

/// One masked failure sample.
#[derive(Debug, Clone, Serialize)]
struct PayloadDetail {
    /// Interaction identifier of the sampled exchange.
    #[serde(rename = "XFapiInteractionID")]
    x_fapi_interaction_id: String,
    /// Consent identifier of the sampled exchange, possibly empty.
    #[serde(rename = "ConsentID")]
    consent_id: String,
    /// Masked payload copy.
    #[serde(rename = "Payload")]
    payload: Map<String, Value>,
    /// Validation errors of the sampled exchange.
    #[serde(rename = "Errors")]
    errors: BTreeMap<String, Vec<String>>,
}

/// Buffered evidence for one endpoint key.
#[derive(Debug, Clone, Serialize)]
struct EndpointEvidence {
    /// Endpoint path suffix.
    #[serde(rename = "EndpointName")]
    endpoint_name: String,
    /// Requests observed in the current window.
    #[serde(rename = "Requests")]
    requests: u64,
    /// Failing requests observed in the current window.
    #[serde(rename = "RequestsWithErrors")]
    requests_with_errors: u64,
    /// Masked samples admitted in the current window.
    #[serde(rename = "PayloadDetails")]
    payload_details: Vec<PayloadDetail>,
}

/// Pending evidence guarded by the buffer mutex.
#[derive(Default)]
struct EvidenceBuffer {
    /// Evidence keyed by `{group}-{basepath}-{endpoint}`.
    summaries: BTreeMap<String, EndpointEvidence>,
    /// Admitted sample counts per error tuple.
    recorded_errors: BTreeMap<String, u32>,
}

/// Cleanup bookkeeping guarded by its own mutex.
#[derive(Default)]
struct GcState {
    /// Date of the most recent cleanup run.
    last_cleanup_date: Option<String>,
}

// ============================================================================
// SECTION: Evidence Store
// ============================================================================

/// Masked failure-sample store with rotation and retention.
pub struct EvidenceStore {
    /// Evidence settings.
    settings: ResultSettings,
    /// Application identifier used in the folder layout.
    application_id: String,
    /// Shared catalog supplying the masking attribute set.
    catalog: CatalogHandle,
    /// Evidence root directory.
    base_path: PathBuf,
    /// Pending evidence buffer.
    buffer: Mutex<EvidenceBuffer>,
    /// Cleanup bookkeeping.
    gc: Mutex<GcState>,
}

impl EvidenceStore {
    /// Creates an evidence store rooted at the default directory.
    #[must_use]
    pub fn new(settings: ResultSettings, application_id: String, catalog: CatalogHandle) -> Self {
        Self {
            settings,
            application_id,
            catalog,
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            buffer: Mutex::new(EvidenceBuffer::default()),
            gc: Mutex::new(GcState::default()),
        }
    }

    /// Overrides the evidence root directory.
    #[must_use]
    pub fn with_base_path(mut self, base_path: PathBuf) -> Self {
        self.base_path = base_path;
        self
    }

    /// Buffers one result, admitting a masked sample when under the cap.
    pub fn append(
        &self,
        message: &Message,
        result: &MessageResult,
        resolution: &EndpointResolution,
    ) {
        if !self.settings.enabled {
            return;
        }
        let key = endpoint_key(resolution);
        let security = self.catalog.security_settings();

        let Ok(mut guard) = self.buffer.lock() else {
            return;
        };
        let buffer = &mut *guard;
        let summary = buffer.summaries.entry(key.clone()).or_insert_with(|| EndpointEvidence {
            endpoint_name: resolution.endpoint.endpoint.clone(),
            requests: 0,
            requests_with_errors: 0,
            payload_details: Vec::new(),
        });
        summary.requests += 1;
        if result.valid {
            return;
        }
        summary.requests_with_errors += 1;

        let mut admit_sample = false;
        for (field, descriptions) in &result.errors {
            for description in descriptions {
                let error_key = format!("{key}-{field}-{description}");
                let recorded = buffer.recorded_errors.entry(error_key).or_insert(0);
                if *recorded >= self.settings.samples_per_error {
                    continue;
                }
                *recorded += 1;
                admit_sample = true;
            }
        }
        if !admit_sample {
            return;
        }

        let mut payload = match message.decode_object() {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "error decoding payload for evidence sample");
                Map::new()
            }
        };
        scramble_payload(&mut payload, &security);
        summary.payload_details.push(PayloadDetail {
            x_fapi_interaction_id: message.x_fapi_interaction_id.to_string(),
            consent_id: message.consent_id.clone().unwrap_or_default(),
            payload,
            errors: result.errors.clone(),
        });
    }

    /// Swaps the buffer and writes one file per API bucket.
    pub fn store_files(&self) {
        info!("executing store of evidence files");
        let drained = {
            let Ok(mut buffer) = self.buffer.lock() else {
                return;
            };
            if buffer.summaries.is_empty() {
                return;
            }
            buffer.recorded_errors.clear();
            mem::take(&mut buffer.summaries)
        };

        let mut files: BTreeMap<String, Vec<EndpointEvidence>> = BTreeMap::new();
        for (key, summary) in drained {
            let api = key.split('-').nth(1).unwrap_or_default().to_string();
            files.entry(api).or_default().push(summary);
        }

        let now = Local::now();
        let date_folder = now.format(DATE_FORMAT).to_string();
        let hour_identifier = now.format(HOUR_FORMAT).to_string();
        for (api, summaries) in files {
            if let Err(err) = self.save_file(&date_folder, &hour_identifier, &api, &summaries) {
                error!(error = %err, api = %api, "error saving evidence file");
            }
        }
    }

    /// Removes date folders older than the retention window.
    pub fn cleanup_files(&self) {
        let cutoff =
            Local::now().date_naive() - chrono::Duration::days(i64::from(self.settings.days_to_store));
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    error!(error = %err, "error reading evidence folder");
                }
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Ok(folder_date) = NaiveDate::parse_from_str(name, DATE_FORMAT) else {
                continue;
            };
            if folder_date < cutoff {
                info!(folder = %path.display(), "removing expired evidence folder");
                if let Err(err) = fs::remove_dir_all(&path) {
                    error!(error = %err, "error removing evidence folder");
                }
            }
        }
    }

    /// Runs the rotation loop until shutdown, storing once more on exit.
    pub async fn run_store_loop(self: Arc<Self>, mut signal: ShutdownSignal) {
        if !self.settings.enabled {
            return;
        }
        let hours = 24 / self.settings.files_per_day;
        let window = Duration::from_secs(u64::from(hours) * 60 * 60);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + window, window);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.store_files(),
                () = signal.triggered() => {
                    self.store_files();
                    break;
                }
            }
        }
    }

    /// Runs the daily cleanup loop until shutdown.
    pub async fn run_cleanup_loop(self: Arc<Self>, mut signal: ShutdownSignal) {
        loop {
            let today = Local::now().format(DATE_FORMAT).to_string();
            let run_cleanup = self
                .gc
                .lock()
                .map(|mut gc| {
                    if gc.last_cleanup_date.as_deref() == Some(today.as_str()) {
                        false
                    } else {
                        gc.last_cleanup_date = Some(today);
                        true
                    }
                })
                .unwrap_or(false);
            if run_cleanup {
                self.cleanup_files();
            }
            tokio::select! {
                () = tokio::time::sleep(CLEANUP_CHECK_INTERVAL) => {}
                () = signal.triggered() => break,
            }
        }
    }

    /// Returns the number of buffered samples for one endpoint key.
    #[must_use]
    pub fn buffered_samples(&self, group: &str, base_path: &str, endpoint: &str) -> usize {
        let key = format!("{group}-{}-{endpoint}", base_path.replace('-', ""));
        self.buffer.lock().map_or(0, |buffer| {
            buffer.summaries.get(&key).map_or(0, |summary| summary.payload_details.len())
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the evidence key for a resolved endpoint.
fn endpoint_key(resolution: &EndpointResolution) -> String {
    format!(
        "{}-{}-{}",
        resolution.group,
        resolution.base_path.replace('-', ""),
        resolution.endpoint.endpoint
    )
}

impl EvidenceStore {
    /// Writes one evidence file for an API bucket.
    fn save_file(
        &self,
        date_folder: &str,
        hour_identifier: &str,
        api: &str,
        summaries: &[EndpointEvidence],
    ) -> io::Result<()> {
        let folder = self.base_path.join(date_folder).join(&self.application_id);
        fs::create_dir_all(&folder)?;
        let file_path = folder.join(format!("{hour_identifier}-{api}.json"));
        let data = serde_json::to_vec_pretty(summaries)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(&file_path, data)?;
        info!(file = %file_path.display(), "evidence file created");
        Ok(())
    }
}
