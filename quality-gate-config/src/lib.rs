// quality-gate-config/src/lib.rs
// ============================================================================
// Module: Quality Gate Configuration
// Description: Settings loading and validation for the agent process.
// Purpose: Provide fail-closed startup configuration with range clamping.
// Dependencies: serde, serde_yaml, uuid
// ============================================================================

//! ## Overview
//! Settings are read from `./settings/settings.yml`, overridden by matching
//! environment variables, and validated before the process starts. Required
//! values (organisation identifier, application mode, HTTPS certificates when
//! enabled) fail closed; out-of-range tunables are reset to their defaults
//! with a warning.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod settings;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use settings::ApplicationMode;
pub use settings::ApplicationSettings;
pub use settings::LoggingSettings;
pub use settings::ReportOverrides;
pub use settings::ResultSettings;
pub use settings::SecuritySettings;
pub use settings::ServerSettings;
pub use settings::Settings;
pub use settings::SettingsError;
