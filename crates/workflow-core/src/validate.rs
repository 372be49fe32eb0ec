// workflow-core/src/validate.rs
// ============================================================================
// Module: Workflow Version Validator
// Description: Publish-time structural checks on a workflow version's block
//              list.
// Purpose: Reject a version before it can be marked Published: duplicate
//          block ids, non-unique order, dangling goto targets, and a block
//          count over MAX_BLOCK_COUNT.
// Dependencies: crate::{limits, model}
// ============================================================================

//! ## Overview
//! `spec.md` states these as invariants ("Invariant: for every Block ...
//! `order` is unique", "fails if target missing") without naming an
//! enforcement point. This validator runs once, at publish time, so a
//! published (immutable) version can never violate them; the interpreter's
//! own tie-break and depth-counting logic is a defense in depth, not the
//! primary enforcement point.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::limits::MAX_BLOCK_COUNT;
use crate::model::BlockType;
use crate::model::WorkflowVersion;

/// A structural defect found while validating a version's block list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecValidationError {
    /// The version has more blocks than `MAX_BLOCK_COUNT`.
    #[error("block count {actual} exceeds MAX_BLOCK_COUNT ({MAX_BLOCK_COUNT})")]
    TooManyBlocks {
        /// Actual block count.
        actual: usize,
    },
    /// Two or more blocks share the same `order` value.
    #[error("duplicate order {order} shared by blocks {first} and {second}")]
    DuplicateOrder {
        /// The colliding order value.
        order: u32,
        /// The first block id observed at this order.
        first: String,
        /// The second block id observed at this order.
        second: String,
    },
    /// A `goto` block's target does not reference a block in the same version.
    #[error("goto block {block_id} targets missing block {target}")]
    GotoTargetMissing {
        /// The goto block whose target is missing.
        block_id: String,
        /// The missing target id.
        target: String,
    },
    /// A `goto` block's `goto_max_concurrent` is not a positive, finite integer.
    #[error("goto block {block_id} has non-positive goto_max_concurrent")]
    GotoInvalidConcurrency {
        /// The offending goto block.
        block_id: String,
    },
}

/// Validates `version`'s block list against the structural invariants that
/// must hold before a version may transition draft → published.
///
/// # Errors
/// Returns the first [`SpecValidationError`] encountered; callers that want
/// every defect should call this repeatedly after fixing each report, or
/// extend it to collect all (not required by any tested property here).
pub fn validate_version(version: &WorkflowVersion) -> Result<(), SpecValidationError> {
    if version.blocks.len() > MAX_BLOCK_COUNT {
        return Err(SpecValidationError::TooManyBlocks { actual: version.blocks.len() });
    }

    let mut seen_orders: std::collections::BTreeMap<u32, String> = std::collections::BTreeMap::new();
    for block in &version.blocks {
        if let Some(first) = seen_orders.get(&block.order) {
            return Err(SpecValidationError::DuplicateOrder {
                order: block.order,
                first: first.clone(),
                second: block.id.as_str().to_string(),
            });
        }
        seen_orders.insert(block.order, block.id.as_str().to_string());
    }

    let known_ids: BTreeSet<&str> = version.blocks.iter().map(|b| b.id.as_str()).collect();
    for block in &version.blocks {
        if block.block_type != BlockType::Goto {
            continue;
        }
        let target = block.logic.get("goto_target_block_id").and_then(|v| v.as_str());
        match target {
            Some(target) if known_ids.contains(target) => {}
            Some(target) => {
                return Err(SpecValidationError::GotoTargetMissing {
                    block_id: block.id.as_str().to_string(),
                    target: target.to_string(),
                });
            }
            None => {
                return Err(SpecValidationError::GotoTargetMissing {
                    block_id: block.id.as_str().to_string(),
                    target: String::new(),
                });
            }
        }
        let max_concurrent = block.logic.get("goto_max_concurrent").and_then(serde_json::Value::as_i64);
        if let Some(value) = max_concurrent
            && value <= 0
        {
            return Err(SpecValidationError::GotoInvalidConcurrency { block_id: block.id.as_str().to_string() });
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::ids::BlockId;
    use crate::ids::VersionNumber;
    use crate::ids::WorkflowId;
    use crate::model::Block;
    use crate::model::TriggerType;
    use crate::model::VersionStatus;
    use serde_json::json;

    fn block(id: &str, order: u32, block_type: BlockType, logic: serde_json::Value) -> Block {
        Block {
            id: BlockId::new(id),
            workflow_id: WorkflowId::new("w1"),
            workflow_version: VersionNumber::new(1),
            name: id.to_string(),
            block_type,
            logic,
            conditions: vec![],
            order,
            notes: None,
        }
    }

    fn version(blocks: Vec<Block>) -> WorkflowVersion {
        WorkflowVersion {
            workflow_id: WorkflowId::new("w1"),
            version: VersionNumber::new(1),
            status: VersionStatus::Draft,
            trigger_type: TriggerType::Api,
            trigger_config: json!({}),
            execution_environments: vec![],
            changelog: None,
            blocks,
        }
    }

    #[test]
    fn duplicate_order_is_rejected() {
        let v = version(vec![
            block("a", 0, BlockType::Math, json!({})),
            block("b", 0, BlockType::Math, json!({})),
        ]);
        assert!(matches!(validate_version(&v), Err(SpecValidationError::DuplicateOrder { .. })));
    }

    #[test]
    fn goto_target_missing_is_rejected() {
        let v = version(vec![block("a", 0, BlockType::Goto, json!({"goto_target_block_id": "ghost"}))]);
        assert!(matches!(validate_version(&v), Err(SpecValidationError::GotoTargetMissing { .. })));
    }

    #[test]
    fn goto_target_present_is_accepted() {
        let v = version(vec![
            block("a", 0, BlockType::Goto, json!({"goto_target_block_id": "b"})),
            block("b", 1, BlockType::Math, json!({})),
        ]);
        assert!(validate_version(&v).is_ok());
    }

    #[test]
    fn non_positive_concurrency_is_rejected() {
        let v = version(vec![block(
            "a",
            0,
            BlockType::Goto,
            json!({"goto_target_block_id": "a", "goto_max_concurrent": 0}),
        )]);
        assert!(matches!(validate_version(&v), Err(SpecValidationError::GotoInvalidConcurrency { .. })));
    }

    #[test]
    fn block_count_ceiling_is_enforced() {
        let blocks = (0..201).map(|i| block(&i.to_string(), i, BlockType::Math, json!({}))).collect();
        let v = version(blocks);
        assert!(matches!(validate_version(&v), Err(SpecValidationError::TooManyBlocks { .. })));
    }
}
