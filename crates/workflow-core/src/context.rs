// workflow-core/src/context.rs
// ============================================================================
// Module: Workflow Execution Context
// Description: The layered read/write surface every block operates on.
// Purpose: Give each of the seven scopes a named, typed field rather than a
//          single dynamic bag, per the engine's "context as a struct" design.
// Dependencies: serde_json, crate::{ids, model, time}
// ============================================================================

//! ## Overview
//! `state`, `cache`, `artifacts`, `secrets`, `event`, `run`, `loops`, and
//! `paths` are kept as distinct fields. The resolver (`crate::resolver`)
//! matches on the reference's scope name and reads the corresponding field;
//! nothing here is a dynamic `HashMap<String, Box<dyn Any>>`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::BlockId;
use crate::ids::RunId;
use crate::ids::StepId;
use crate::ids::VersionNumber;
use crate::ids::WorkflowId;
use crate::model::Artifact;
use crate::model::RunStatus;
use crate::model::TriggerType;
use crate::time::Timestamp;

/// Reserved top-level state keys that authors must not use, since they
/// collide with reference-resolver scope prefixes.
pub const RESERVED_PREFIXES: &[&str] = &[
    "state", "cache", "artifacts", "secrets", "paths", "event", "run", "error", "now", "loop",
    "row", "item", "index", "keys", "block",
];

/// Returns true if `key` collides with a reserved top-level scope name.
#[must_use]
pub fn is_reserved_state_key(key: &str) -> bool {
    RESERVED_PREFIXES.contains(&key)
}

/// The `$run` scope: run and current-block metadata, refreshed by the
/// interpreter before each dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunScope {
    /// The run's identifier.
    pub id: RunId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The version snapshot being executed.
    pub version_id: VersionNumber,
    /// Current run status.
    pub status: RunStatus,
    /// What triggered this run.
    pub trigger_type: TriggerType,
    /// When the run started.
    pub started_at: Timestamp,
    /// Execution environment identifier (platform name).
    pub platform: Option<String>,
    /// Device identifier, when supplied by the trigger.
    pub device_id: Option<String>,
    /// Current step id, set once dispatch begins.
    pub step_id: Option<StepId>,
    /// Zero-based index of the current block within the version.
    pub step_index: Option<usize>,
    /// Current block id.
    pub block_id: Option<BlockId>,
    /// Current block name.
    pub block_name: Option<String>,
    /// Current block type, as its wire name.
    pub block_type: Option<String>,
}

/// One active goto-loop's iteration state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Zero-based iteration count for this loop.
    pub index: u64,
    /// Artifact bound to the current iteration, for deferred fan-out.
    pub artifact: Option<Value>,
}

/// The full runtime context a block operates on.
///
/// Invariant: `secrets` is populated once at run start and never mutated by
/// a handler; only `state`, `cache`, and `artifacts` are written through
/// `BlockResult` deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Primary mutable surface; blocks write via their `*_bind_value`.
    pub state: BTreeMap<String, Value>,
    /// Ephemeral scratch space; cleared per run.
    pub cache: BTreeMap<String, Value>,
    /// Append-mostly artifact list.
    pub artifacts: Vec<Artifact>,
    /// Populated at run start from the credential store; read-only.
    pub secrets: BTreeMap<String, String>,
    /// Trigger payload; read-only after run start.
    pub event: Value,
    /// Run and current-block metadata.
    pub run: RunScope,
    /// One entry per active goto-loop.
    pub loops: BTreeMap<String, LoopState>,
    /// Platform-provided directories.
    pub paths: BTreeMap<String, String>,
}

impl WorkflowContext {
    /// Builds the initial context for a fresh run.
    #[must_use]
    pub fn new(run: RunScope, event: Value, secrets: BTreeMap<String, String>, paths: BTreeMap<String, String>) -> Self {
        Self {
            state: BTreeMap::new(),
            cache: BTreeMap::new(),
            artifacts: Vec::new(),
            secrets,
            event,
            run,
            loops: BTreeMap::new(),
            paths,
        }
    }

    /// Merges a state delta into `state`, overwriting colliding keys.
    pub fn apply_state_delta(&mut self, delta: BTreeMap<String, Value>) {
        self.state.extend(delta);
    }

    /// Merges a cache delta into `cache`, overwriting colliding keys.
    pub fn apply_cache_delta(&mut self, delta: BTreeMap<String, Value>) {
        self.cache.extend(delta);
    }

    /// Appends artifacts produced by the current block.
    pub fn append_artifacts(&mut self, artifacts: Vec<Artifact>) {
        self.artifacts.extend(artifacts);
    }

    /// Writes `value` at a handler's bind path.
    ///
    /// Accepts either a bare key (`"greeting"`) or a `$state.`-prefixed
    /// reference (`"$state.greeting"`); both resolve to the same top-level
    /// `state` key. Nested dotted paths are not supported by the bind
    /// convention — only a single top-level key.
    pub fn bind_value(&mut self, bind_path: &str, value: Value) {
        let key = bind_path.strip_prefix("$state.").unwrap_or(bind_path);
        self.state.insert(key.to_string(), value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_run_scope() -> RunScope {
        RunScope {
            id: RunId::new("r1"),
            workflow_id: WorkflowId::new("w1"),
            version_id: VersionNumber::new(1),
            status: RunStatus::Running,
            trigger_type: TriggerType::Api,
            started_at: Timestamp::now(),
            platform: None,
            device_id: None,
            step_id: None,
            step_index: None,
            block_id: None,
            block_name: None,
            block_type: None,
        }
    }

    #[test]
    fn bind_value_strips_state_prefix() {
        let mut ctx = WorkflowContext::new(sample_run_scope(), json!({}), BTreeMap::new(), BTreeMap::new());
        ctx.bind_value("$state.greeting", json!("hi"));
        assert_eq!(ctx.state.get("greeting"), Some(&json!("hi")));
    }

    #[test]
    fn bind_value_accepts_bare_key() {
        let mut ctx = WorkflowContext::new(sample_run_scope(), json!({}), BTreeMap::new(), BTreeMap::new());
        ctx.bind_value("greeting", json!("hi"));
        assert_eq!(ctx.state.get("greeting"), Some(&json!("hi")));
    }

    #[test]
    fn reserved_prefix_detection() {
        assert!(is_reserved_state_key("secrets"));
        assert!(!is_reserved_state_key("greeting"));
    }

    #[test]
    fn state_delta_merges_and_overwrites() {
        let mut ctx = WorkflowContext::new(sample_run_scope(), json!({}), BTreeMap::new(), BTreeMap::new());
        ctx.state.insert("a".to_string(), json!(1));
        let mut delta = BTreeMap::new();
        delta.insert("a".to_string(), json!(2));
        delta.insert("b".to_string(), json!(3));
        ctx.apply_state_delta(delta);
        assert_eq!(ctx.state.get("a"), Some(&json!(2)));
        assert_eq!(ctx.state.get("b"), Some(&json!(3)));
    }
}
