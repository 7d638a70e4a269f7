// quality-gate-core/src/validator.rs
// ============================================================================
// Module: Schema Validator
// Description: JSON-Schema validation with normalized error paths.
// Purpose: Produce stable field paths and descriptions for reporting.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! [`SchemaValidator`] validates a decoded payload against a JSON Schema
//! carried as text in the endpoint catalog. Engine errors are surfaced to the
//! caller; schema violations are normalized into [`ValidationResult`] entries
//! whose field paths drop numeric array indices and a leading `data` token,
//! and whose descriptions carry a `(root)`-anchored location prefix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jsonschema::Draft;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use thiserror::Error;

use crate::message::ValidationResult;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the validation engine itself.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Schema text failed to parse as JSON.
    #[error("schema parse failure: {0}")]
    SchemaParse(String),
    /// Schema parsed but failed to compile.
    #[error("schema compile failure: {0}")]
    SchemaCompile(String),
}

// ============================================================================
// SECTION: Schema Validator
// ============================================================================

/// Validator applying one JSON Schema to decoded payloads.
pub struct SchemaValidator {
    /// Schema text; empty means every payload is trivially valid.
    schema: String,
}

impl SchemaValidator {
    /// Creates a validator for the given schema text.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Validates a payload against the configured schema.
    ///
    /// An empty schema yields a passing result. Schema violations are data,
    /// not errors: they are returned inside the [`ValidationResult`].
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError`] when the schema cannot be parsed or
    /// compiled.
    pub fn validate(&self, payload: &Value) -> Result<ValidationResult, ValidatorError> {
        if self.schema.is_empty() {
            return Ok(ValidationResult::passed());
        }

        let schema_value: Value = serde_json::from_str(&self.schema)
            .map_err(|err| ValidatorError::SchemaParse(err.to_string()))?;
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(&schema_value)
            .map_err(|err| ValidatorError::SchemaCompile(err.to_string()))?;

        let mut result = ValidationResult::passed();
        for error in compiled.iter_errors(payload) {
            let location = clean_path(&error.instance_path.to_string());
            let (field, description) = match &error.kind {
                ValidationErrorKind::Required {
                    property,
                } => {
                    let property = match property.as_str() {
                        Some(name) => name.to_string(),
                        None => property.to_string(),
                    };
                    let field = if location == ROOT_LABEL {
                        property.clone()
                    } else {
                        format!("{location}.{property}")
                    };
                    (field, format!("{location}: {property} is required"))
                }
                _ => (location.clone(), format!("{location}: {error}")),
            };
            if description.contains("\"if\"") {
                continue;
            }
            result.errors.entry(field).or_default().push(description);
        }

        result.valid = result.errors.is_empty();
        Ok(result)
    }
}

// ============================================================================
// SECTION: Path Normalization
// ============================================================================

/// Label used for errors anchored at the document root.
const ROOT_LABEL: &str = "(root)";

/// Normalizes an instance path into a reporting field path.
///
/// Numeric array indices and a leading `data` token are dropped so samples
/// of the same defect collapse onto one field key regardless of position.
fn clean_path(pointer: &str) -> String {
    let mut segments = Vec::new();
    for (index, segment) in pointer.split('/').filter(|s| !s.is_empty()).enumerate() {
        if segment.parse::<f64>().is_ok() {
            continue;
        }
        if index == 0 && segment == "data" {
            continue;
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        ROOT_LABEL.to_string()
    } else {
        segments.join(".")
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
