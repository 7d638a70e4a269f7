// quality-gate-core/src/masking.rs
// ============================================================================
// Module: Payload Masking
// Description: Structural masking fold over sampled payloads.
// Purpose: Strip sensitive attribute values before evidence is persisted.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Evidence samples retain failing payloads for operator review. Before a
//! payload is buffered, every attribute named in the catalog's mask set is
//! replaced in place, at any depth. Recursion covers nested objects and
//! arrays of objects; primitive array elements are left untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::catalog::SecuritySettings;

// ============================================================================
// SECTION: Masking Fold
// ============================================================================

/// Masks every sensitive attribute of a payload in place.
pub fn scramble_payload(payload: &mut Map<String, Value>, security: &SecuritySettings) {
    for (key, value) in payload.iter_mut() {
        if security.have_to_mask(key) {
            *value = scramble_value(value);
            continue;
        }
        match value {
            Value::Object(nested) => scramble_payload(nested, security),
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::Object(nested) = item {
                        scramble_payload(nested, security);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Produces the masked replacement for a single value.
fn scramble_value(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            let count = text.chars().count();
            if count > 2 {
                let mut chars = text.chars();
                let first = chars.next().unwrap_or('*');
                let last = chars.next_back().unwrap_or('*');
                Value::String(format!("{first}{}{last}", "*".repeat(count - 2)))
            } else {
                Value::String("*".repeat(count))
            }
        }
        Value::Number(_) => json!(0),
        Value::Bool(_) => Value::Bool(false),
        _ => Value::String("**********".to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
