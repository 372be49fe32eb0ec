// workflow-handlers/src/bind.rs
// ============================================================================
// Module: Handler Bind Convention
// Description: Shared helpers implementing the `<type>_bind_value` contract.
// Purpose: Give every handler a single way to read its declared schema
// fields and write its result at the bound state key.
// Dependencies: serde_json, workflow-core
// ============================================================================

//! ## Overview
//! Per, each block type declares a `<type>_bind_value` logic field. A
//! value of `"$state.x"` or bare `"x"` both resolve to the same top-level
//! `state` key — [`workflow_core::WorkflowContext::bind_value`] already
//! strips the prefix, so handlers only need to build the delta map with the
//! stripped key.

use std::collections::BTreeMap;

use serde_json::Value;
use workflow_core::Completion;
use workflow_core::HandlerError;

/// Strips an optional `$state.` prefix from a bind path.
#[must_use]
pub fn bind_key(bind_path: &str) -> &str {
    bind_path.strip_prefix("$state.").unwrap_or(bind_path)
}

/// Builds a [`Completion`] that writes `value` at `bind_path`, if present.
/// A block with no bind path configured produces an empty completion —
/// the block still ran, it just has nowhere declared to write its result.
#[must_use]
pub fn bind_completion(bind_path: Option<&str>, value: Value) -> Completion {
    let mut state_delta = BTreeMap::new();
    if let Some(path) = bind_path {
        state_delta.insert(bind_key(path).to_string(), value);
    }
    Completion { state_delta, cache_delta: BTreeMap::new(), artifacts: vec![] }
}

/// Reads a required string field from `logic`, or a [`HandlerError`].
///
/// # Errors
/// Returns `VALIDATION_ERROR` when the field is absent or not a string.
pub fn required_str<'a>(logic: &'a Value, field: &str) -> Result<&'a str, HandlerError> {
    logic
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("VALIDATION_ERROR", format!("missing required field: {field}")))
}

/// Reads an optional string field from `logic`.
#[must_use]
pub fn optional_str<'a>(logic: &'a Value, field: &str) -> Option<&'a str> {
    logic.get(field).and_then(Value::as_str)
}

/// Reads an optional u64 field from `logic`, falling back to `default`.
#[must_use]
pub fn optional_u64(logic: &Value, field: &str, default: u64) -> u64 {
    logic.get(field).and_then(Value::as_u64).unwrap_or(default)
}
