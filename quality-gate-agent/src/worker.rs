// quality-gate-agent/src/worker.rs
// ============================================================================
// Module: Validation Worker
// Description: Single consumer of the message queue.
// Purpose: Validate payloads and fan results out to their consumers.
// Dependencies: quality-gate-core, tokio
// ============================================================================

//! ## Overview
//! The worker drains the queue one message at a time. Each message is
//! re-resolved against the current catalog because the schema may have
//! changed since admission; a message whose endpoint is gone is dropped
//! without a result. Engine failures never crash the worker: they become a
//! failing result with a single `(error)` entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use quality_gate_core::Message;
use quality_gate_core::MessageResult;
use quality_gate_core::SchemaValidator;
use quality_gate_core::ValidationResult;
use quality_gate_core::ValidatorError;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::aggregator::Aggregator;
use crate::catalog::CatalogHandle;
use crate::evidence::EvidenceStore;
use crate::metrics::Metrics;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine-level failures while processing one message.
#[derive(Debug, Error)]
enum ProcessError {
    /// Body failed to decode as a JSON object.
    #[error("body decode failure: {0}")]
    Decode(String),
    /// Schema engine failed.
    #[error(transparent)]
    Engine(#[from] ValidatorError),
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Field key carrying engine failures in a result.
const ENGINE_ERROR_FIELD: &str = "(error)";

/// Single consumer of the validation queue.
pub struct Worker {
    /// Shared catalog for re-resolution.
    catalog: CatalogHandle,
    /// Aggregation sink for results.
    aggregator: Arc<Aggregator>,
    /// Evidence sink for failure samples.
    evidence: Arc<EvidenceStore>,
    /// Agent metrics.
    metrics: Arc<Metrics>,
}

impl Worker {
    /// Creates a worker over the shared services.
    #[must_use]
    pub fn new(
        catalog: CatalogHandle,
        aggregator: Arc<Aggregator>,
        evidence: Arc<EvidenceStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            aggregator,
            evidence,
            metrics,
        }
    }

    /// Consumes the queue until it is sealed and drained.
    pub async fn run(self, mut rx: mpsc::Receiver<Message>) {
        info!("worker started");
        while let Some(message) = rx.recv().await {
            self.process_message(&message);
        }
        info!("worker stopped, queue drained");
    }

    /// Validates one message and fans the result out.
    fn process_message(&self, message: &Message) {
        let Some(resolution) = self.catalog.resolve_endpoint(&message.endpoint) else {
            warn!(endpoint = %message.endpoint, "ignoring message with unresolved endpoint");
            return;
        };

        let outcome = match self.validate_message(message, &resolution.endpoint.body_schema) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(endpoint = %message.endpoint, error = %err, "error during validation");
                ValidationResult::failed(ENGINE_ERROR_FIELD, err.to_string())
            }
        };

        let result = MessageResult::from_outcome(message, outcome);
        self.metrics.observe_validation(&result.server_id, &result.endpoint, result.valid);
        self.evidence.append(message, &result, &resolution);
        self.aggregator.append(result);
    }

    /// Decodes the body and applies the endpoint schema.
    fn validate_message(
        &self,
        message: &Message,
        schema: &str,
    ) -> Result<ValidationResult, ProcessError> {
        let object =
            message.decode_object().map_err(|err| ProcessError::Decode(err.to_string()))?;
        let validator = SchemaValidator::new(schema);
        Ok(validator.validate(&Value::Object(object))?)
    }
}
