// workflow-core/src/block_result.rs
// ============================================================================
// Module: Block Handler Result
// Description: The tagged result a handler returns for one dispatched block.
// Purpose: Make interpreter dispatch a total match over a closed variant set,
// rather than juggling an object of optional fields.
// Dependencies: serde_json, crate::model
// ============================================================================

//! ## Overview
//! `BlockResult` is a sum type: `Completed | Paused | Goto`, not a struct
//! with several optional fields that could be set inconsistently (e.g. both
//! a pause and a goto at once).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;
use crate::model::Artifact;

/// Directs the interpreter to jump, or schedule a deferred iteration, at a
/// target block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoDirective {
    /// The block id to jump (or fan out) to.
    pub target: String,
    /// If true, enqueue for deferred fan-out instead of jumping synchronously.
    pub defer: bool,
    /// Maximum concurrent deferred workers, clamped to `[1, MAX_CONCURRENT_DEFERRED]`.
    pub max_concurrent: u32,
    /// Optional loop name exposed at `$loops.<name>`.
    pub loop_name: Option<String>,
}

/// The kind of interactive pause a UI block requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// `ui_camera` pause.
    UiCamera,
    /// `ui_form` pause.
    UiForm,
    /// `ui_table` pause.
    UiTable,
    /// `ui_details` pause.
    UiDetails,
}

/// A handler's request to suspend the run pending external input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseDirective {
    /// Which interactive block type is pausing.
    pub kind: PauseKind,
    /// The resolved UI configuration payload, shaped per `kind`.
    pub payload: Value,
    /// The bind path the external response should be written to on resume.
    pub bind_value: Option<String>,
}

/// The successful, non-suspending outcome of dispatching a block: state,
/// cache, and artifact deltas to fold into the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Merged into `ctx.state`.
    #[serde(default)]
    pub state_delta: BTreeMap<String, Value>,
    /// Merged into `ctx.cache`.
    #[serde(default)]
    pub cache_delta: BTreeMap<String, Value>,
    /// Appended to `ctx.artifacts`.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// The closed set of outcomes a block handler can return.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockResult {
    /// The block finished synchronously; fold the deltas and continue.
    Completed(Completion),
    /// The block requests an interactive pause.
    Paused(PauseDirective),
    /// The block issues a flow-control directive.
    Goto(GotoDirective),
}

impl BlockResult {
    /// Builds a `Completed` result with no deltas.
    #[must_use]
    pub fn empty_completion() -> Self {
        Self::Completed(Completion::default())
    }
}

/// A block handler: maps `(Block, Context)` to a fallible [`BlockResult`].
pub type HandlerResult = Result<BlockResult, HandlerError>;
