// workflow-server/src/pagination.rs
// ============================================================================
// Module: Cursor Pagination
// Description: Opaque base64url keyset cursors over a `Vec<Run>` page.
// Purpose: Implement the `GET /runs` contract: `{id, sortField, sortValue}`
// cursor payload, fetch size `limit + 1`, `limit` clamped [1, 250].
// Dependencies: base64, serde_json, workflow-core::{limits, model}
// ============================================================================

//! ## Overview
//! `SqliteRunRepository::list_runs` returns every run for a workflow already
//! sorted newest-first. Pagination here is keyset-by-position over that
//! slice rather than a second store query — correct for the in-process
//! single-connection store this crate ships, and easy to swap for a real
//! `WHERE (started_at, id) < (?, ?)` predicate if the store grows one.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde::Serialize;
use workflow_core::limits::PAGINATION_DEFAULT_SIZE;
use workflow_core::limits::PAGINATION_MAX_SIZE;
use workflow_core::model::Run;

use crate::error::ApiError;

/// The decoded contents of an opaque page cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    /// The last-seen row's id.
    pub id: String,
    /// The field the list is sorted by.
    #[serde(rename = "sortField")]
    pub sort_field: String,
    /// The last-seen row's value for `sortField`.
    #[serde(rename = "sortValue")]
    pub sort_value: String,
}

/// Encodes a cursor pointing just past `run`.
#[must_use]
pub fn encode_cursor(run: &Run) -> String {
    let cursor = Cursor {
        id: run.id.as_str().to_string(),
        sort_field: "started_at".to_string(),
        sort_value: run.started_at.to_rfc3339(),
    };
    let json = serde_json::to_vec(&cursor).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes an opaque cursor string from a query parameter.
///
/// # Errors
/// Returns [`ApiError::bad_request`] when the cursor is not valid base64url
/// or does not decode to the expected JSON shape.
pub fn decode_cursor(raw: &str) -> Result<Cursor, ApiError> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| ApiError::bad_request("cursor is not valid base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| ApiError::bad_request("cursor payload is malformed"))
}

/// Clamps a requested page size to `[1, PAGINATION_MAX_SIZE]`, defaulting to
/// `PAGINATION_DEFAULT_SIZE` when unset.
#[must_use]
pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(PAGINATION_DEFAULT_SIZE).clamp(1, PAGINATION_MAX_SIZE)
}

/// A single page of runs plus the cursor for the next page, if any.
pub struct Page {
    /// The page's rows.
    pub items: Vec<Run>,
    /// Opaque cursor for the next page, absent once exhausted.
    pub next_cursor: Option<String>,
}

/// Slices `runs` (already sorted newest-first) into one page, starting just
/// after `cursor` when present.
#[must_use]
pub fn paginate(runs: &[Run], cursor: Option<&Cursor>, limit: usize) -> Page {
    let start = cursor
        .and_then(|cursor| runs.iter().position(|run| run.id.as_str() == cursor.id))
        .map_or(0, |index| index + 1);
    let remaining = &runs[start.min(runs.len())..];
    let mut fetched: Vec<Run> = remaining.iter().take(limit + 1).cloned().collect();
    let has_more = fetched.len() > limit;
    fetched.truncate(limit);
    let next_cursor = if has_more { fetched.last().map(encode_cursor) } else { None };
    Page { items: fetched, next_cursor }
}
