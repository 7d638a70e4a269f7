// quality-gate-config/src/settings.rs
// ============================================================================
// Module: Agent Settings
// Description: File and environment backed configuration of the agent.
// Purpose: Load, override, and validate startup settings.
// Dependencies: serde, serde_yaml, uuid
// ============================================================================

//! ## Overview
//! `settings.yml` supplies defaults and environment variables override
//! matching fields. Validation distinguishes fatal problems (missing
//! organisation identifier or application mode, absent certificates when
//! HTTPS is enabled) from tunables that are clamped back to their defaults.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default settings file location.
pub const SETTINGS_FILE: &str = "./settings/settings.yml";
/// Environment variable carrying the agent organisation identifier.
pub const SERVER_ORG_ID_ENV: &str = "SERVER_ORG_ID";
/// Environment variable carrying the application mode.
pub const APPLICATION_MODE_ENV: &str = "APPLICATION_MODE";
/// Default directory holding the TLS certificate pair.
const DEFAULT_CERTIFICATE_PATH: &str = "/certificates";
/// Default evidence files written per day.
const DEFAULT_FILES_PER_DAY: u32 = 8;
/// Default retained samples per error tuple.
const DEFAULT_SAMPLES_PER_ERROR: u32 = 5;
/// Default evidence retention in days.
const DEFAULT_DAYS_TO_STORE: u32 = 7;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be opened or read.
    #[error("settings file read failure: {0}")]
    Io(String),
    /// Settings file content failed to parse.
    #[error("settings parse failure: {0}")]
    Parse(String),
    /// Settings are structurally valid but unusable.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Settings Types
// ============================================================================

/// Operating mode of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ApplicationMode {
    /// Agent validating payloads it transmitted.
    #[serde(rename = "TRANSMITTER")]
    Transmitter,
    /// Agent validating payloads it received.
    #[serde(rename = "RECEIVER")]
    Receiver,
}

impl fmt::Display for ApplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmitter => f.write_str("TRANSMITTER"),
            Self::Receiver => f.write_str("RECEIVER"),
        }
    }
}

impl FromStr for ApplicationMode {
    type Err = SettingsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "TRANSMITTER" => Ok(Self::Transmitter),
            "RECEIVER" => Ok(Self::Receiver),
            other => Err(SettingsError::Invalid(format!(
                "{APPLICATION_MODE_ENV} must be TRANSMITTER or RECEIVER, got {other}"
            ))),
        }
    }
}

/// Identity settings of the agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationSettings {
    /// Organisation identifier of this agent (UUID).
    #[serde(default)]
    pub organisation_id: String,
    /// Operating mode; required at startup.
    #[serde(default)]
    pub mode: Option<ApplicationMode>,
}

/// Ingress server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Port the API server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Environment label; `DEBUG` shortens the background loop periods.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: default_environment(),
        }
    }
}

impl ServerSettings {
    /// Returns true when the agent runs in the DEBUG environment.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.environment == "DEBUG"
    }
}

/// Local overrides for the reporting cadence.
///
/// A value of zero means "use the catalog-supplied value".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportOverrides {
    /// Report execution window override in minutes (1..=60).
    #[serde(default)]
    pub execution_window: u32,
    /// Count-trigger override (10_000..=200_000).
    #[serde(default)]
    pub execution_number: u32,
}

/// Transport security and central server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    /// Whether the ingress server terminates TLS.
    #[serde(default)]
    pub enable_https: bool,
    /// Base URL of the central collection service.
    #[serde(default)]
    pub server_url: String,
    /// Directory holding `server.crt` and `server.key`.
    #[serde(default = "default_certificate_path")]
    pub certificate_path: PathBuf,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enable_https: false,
            server_url: String::new(),
            certificate_path: default_certificate_path(),
        }
    }
}

impl SecuritySettings {
    /// Path of the TLS certificate file.
    #[must_use]
    pub fn cert_file(&self) -> PathBuf {
        self.certificate_path.join("server.crt")
    }

    /// Path of the TLS private key file.
    #[must_use]
    pub fn key_file(&self) -> PathBuf {
        self.certificate_path.join("server.key")
    }
}

/// Evidence store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultSettings {
    /// Whether failure samples are retained locally.
    #[serde(default)]
    pub enabled: bool,
    /// Evidence files written per day (1..=24).
    #[serde(default = "default_files_per_day")]
    pub files_per_day: u32,
    /// Retained samples per error tuple (1..=10).
    #[serde(default = "default_samples_per_error")]
    pub samples_per_error: u32,
    /// Evidence retention in days (1..=10).
    #[serde(default = "default_days_to_store")]
    pub days_to_store: u32,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            files_per_day: default_files_per_day(),
            samples_per_error: default_samples_per_error(),
            days_to_store: default_days_to_store(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete agent settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Identity settings.
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Ingress server settings.
    #[serde(default)]
    pub server: ServerSettings,
    /// Reporting cadence overrides.
    #[serde(default)]
    pub report: ReportOverrides,
    /// Transport security settings.
    #[serde(default)]
    pub security: SecuritySettings,
    /// Evidence store settings.
    #[serde(default)]
    pub result: ResultSettings,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Process-unique identifier, generated at load time.
    #[serde(skip)]
    pub application_id: Uuid,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl Settings {
    /// Loads settings from the default location with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the file is unreadable, unparseable, or
    /// fails validation.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    /// Loads settings from an explicit path with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when the file is unreadable, unparseable, or
    /// fails validation.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let file = File::open(path).map_err(|err| SettingsError::Io(err.to_string()))?;
        let mut settings: Self =
            serde_yaml::from_reader(file).map_err(|err| SettingsError::Parse(err.to_string()))?;
        settings.apply_overrides(|name| env::var(name).ok())?;
        settings.validate()?;
        settings.application_id = Uuid::new_v4();
        Ok(settings)
    }

    /// Applies environment overrides from the given lookup.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when an override value fails to parse.
    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(value) = lookup(SERVER_ORG_ID_ENV) {
            self.application.organisation_id = value;
        }
        if let Some(value) = lookup(APPLICATION_MODE_ENV) {
            self.application.mode = Some(value.parse()?);
        }
        if let Some(value) = lookup("ENVIRONMENT") {
            self.server.environment = value;
        }
        if let Some(value) = lookup("API_PORT") {
            self.server.port = parse_override("API_PORT", &value)?;
        }
        if let Some(value) = lookup("SERVER_URL") {
            self.security.server_url = value;
        }
        if let Some(value) = lookup("ENABLE_HTTPS") {
            self.security.enable_https = parse_override("ENABLE_HTTPS", &value)?;
        }
        if let Some(value) = lookup("LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("REPORT_EXECUTION_WINDOW") {
            self.report.execution_window = parse_override("REPORT_EXECUTION_WINDOW", &value)?;
        }
        if let Some(value) = lookup("REPORT_EXECUTION_NUMBER") {
            self.report.execution_number = parse_override("REPORT_EXECUTION_NUMBER", &value)?;
        }
        if let Some(value) = lookup("RESULT_ENABLED") {
            self.result.enabled = parse_override("RESULT_ENABLED", &value)?;
        }
        if let Some(value) = lookup("RESULT_FILES_PER_DAY") {
            self.result.files_per_day = parse_override("RESULT_FILES_PER_DAY", &value)?;
        }
        if let Some(value) = lookup("RESULT_SAMPLES_PER_ERROR") {
            self.result.samples_per_error = parse_override("RESULT_SAMPLES_PER_ERROR", &value)?;
        }
        if let Some(value) = lookup("RESULT_DAYS_TO_STORE") {
            self.result.days_to_store = parse_override("RESULT_DAYS_TO_STORE", &value)?;
        }
        Ok(())
    }

    /// Validates required fields and clamps out-of-range tunables.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] for unusable required values.
    fn validate(&mut self) -> Result<(), SettingsError> {
        if self.application.mode.is_none() {
            return Err(SettingsError::Invalid(format!(
                "application mode missing; set {APPLICATION_MODE_ENV} to TRANSMITTER or RECEIVER"
            )));
        }
        Uuid::parse_str(&self.application.organisation_id).map_err(|_| {
            SettingsError::Invalid(format!(
                "organisation id missing or malformed; set {SERVER_ORG_ID_ENV} to a UUID"
            ))
        })?;
        if self.security.server_url.is_empty() {
            return Err(SettingsError::Invalid(
                "central server url missing; set SERVER_URL or security.server_url".to_string(),
            ));
        }

        if self.report.execution_window != 0 && !(1..=60).contains(&self.report.execution_window) {
            warn!(
                value = self.report.execution_window,
                "REPORT_EXECUTION_WINDOW out of range (1-60), using catalog value"
            );
            self.report.execution_window = 0;
        }
        if self.report.execution_number != 0
            && !(10_000..=200_000).contains(&self.report.execution_number)
        {
            warn!(
                value = self.report.execution_number,
                "REPORT_EXECUTION_NUMBER out of range (10000-200000), using catalog value"
            );
            self.report.execution_number = 0;
        }
        if !(1..=24).contains(&self.result.files_per_day) {
            warn!(
                value = self.result.files_per_day,
                "RESULT_FILES_PER_DAY out of range (1-24), using default"
            );
            self.result.files_per_day = DEFAULT_FILES_PER_DAY;
        }
        if !(1..=10).contains(&self.result.samples_per_error) {
            warn!(
                value = self.result.samples_per_error,
                "RESULT_SAMPLES_PER_ERROR out of range (1-10), using default"
            );
            self.result.samples_per_error = DEFAULT_SAMPLES_PER_ERROR;
        }
        if !(1..=10).contains(&self.result.days_to_store) {
            warn!(
                value = self.result.days_to_store,
                "RESULT_DAYS_TO_STORE out of range (1-10), using default"
            );
            self.result.days_to_store = DEFAULT_DAYS_TO_STORE;
        }

        if self.security.enable_https {
            for file in [self.security.cert_file(), self.security.key_file()] {
                if !file.exists() {
                    return Err(SettingsError::Invalid(format!(
                        "https enabled but certificate file missing: {}",
                        file.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parses one override value, naming the variable on failure.
fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T, SettingsError> {
    value
        .parse()
        .map_err(|_| SettingsError::Invalid(format!("{name} has an unparseable value: {value}")))
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "PRODUCTION".to_string()
}

fn default_certificate_path() -> PathBuf {
    PathBuf::from(DEFAULT_CERTIFICATE_PATH)
}

fn default_files_per_day() -> u32 {
    DEFAULT_FILES_PER_DAY
}

fn default_samples_per_error() -> u32 {
    DEFAULT_SAMPLES_PER_ERROR
}

fn default_days_to_store() -> u32 {
    DEFAULT_DAYS_TO_STORE
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_settings() -> Settings {
        Settings {
            application: ApplicationSettings {
                organisation_id: "11111111-1111-1111-1111-111111111111".to_string(),
                mode: Some(ApplicationMode::Transmitter),
            },
            security: SecuritySettings {
                server_url: "https://collector.example".to_string(),
                ..SecuritySettings::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn validate_accepts_complete_settings() {
        let mut settings = base_settings();
        settings.validate().expect("valid");
    }

    #[test]
    fn validate_requires_application_mode() {
        let mut settings = base_settings();
        settings.application.mode = None;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn validate_requires_uuid_organisation_id() {
        let mut settings = base_settings();
        settings.application.organisation_id = "not-a-uuid".to_string();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn validate_requires_server_url() {
        let mut settings = base_settings();
        settings.security.server_url = String::new();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn out_of_range_report_window_falls_back_to_catalog() {
        let mut settings = base_settings();
        settings.report.execution_window = 61;
        settings.validate().expect("valid");
        assert_eq!(settings.report.execution_window, 0);
    }

    #[test]
    fn out_of_range_report_number_falls_back_to_catalog() {
        let mut settings = base_settings();
        settings.report.execution_number = 9_999;
        settings.validate().expect("valid");
        assert_eq!(settings.report.execution_number, 0);
    }

    #[test]
    fn out_of_range_days_to_store_resets_days_to_store() {
        let mut settings = base_settings();
        settings.result.days_to_store = 45;
        settings.result.samples_per_error = 9;
        settings.validate().expect("valid");
        assert_eq!(settings.result.days_to_store, DEFAULT_DAYS_TO_STORE);
        // The samples cap is untouched by the retention clamp.
        assert_eq!(settings.result.samples_per_error, 9);
    }

    #[test]
    fn out_of_range_files_and_samples_reset_to_defaults() {
        let mut settings = base_settings();
        settings.result.files_per_day = 0;
        settings.result.samples_per_error = 11;
        settings.validate().expect("valid");
        assert_eq!(settings.result.files_per_day, DEFAULT_FILES_PER_DAY);
        assert_eq!(settings.result.samples_per_error, DEFAULT_SAMPLES_PER_ERROR);
    }

    #[test]
    fn https_without_certificates_is_fatal() {
        let mut settings = base_settings();
        settings.security.enable_https = true;
        settings.security.certificate_path = PathBuf::from("/definitely/not/here");
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut vars = HashMap::new();
        vars.insert("SERVER_ORG_ID", "22222222-2222-2222-2222-222222222222");
        vars.insert("APPLICATION_MODE", "RECEIVER");
        vars.insert("API_PORT", "9443");
        vars.insert("RESULT_DAYS_TO_STORE", "3");
        let mut settings = base_settings();
        settings
            .apply_overrides(|name| vars.get(name).map(|value| (*value).to_string()))
            .expect("overrides");
        assert_eq!(
            settings.application.organisation_id,
            "22222222-2222-2222-2222-222222222222"
        );
        assert_eq!(settings.application.mode, Some(ApplicationMode::Receiver));
        assert_eq!(settings.server.port, 9443);
        assert_eq!(settings.result.days_to_store, 3);
    }

    #[test]
    fn malformed_override_is_an_error() {
        let mut settings = base_settings();
        let result = settings.apply_overrides(|name| {
            (name == "API_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let mut settings = base_settings();
        let result = settings.apply_overrides(|name| {
            (name == APPLICATION_MODE_ENV).then(|| "PROXY".to_string())
        });
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }
}
