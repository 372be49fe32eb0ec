// workflow-handlers/src/goto.rs
// ============================================================================
// Module: Goto Handler
// Description: Flow-control jump/loop directive handler.
// Purpose: Validate a `goto` block's logic and emit the directive the
// interpreter's own dispatch loop acts on.
// Dependencies: workflow-core
// ============================================================================

//! ## Overview
//! This handler performs the block-author-facing validation named here
//! ("fails if target missing or max_concurrent <= 0 or non-finite"). The
//! interpreter independently re-checks target existence against the
//! version's actual block set (`GOTO_TARGET_MISSING`) and the synchronous
//! chain depth (`GOTO_DEPTH_EXCEEDED`) — this handler cannot see either, so
//! it only rejects structurally invalid logic.

use async_trait::async_trait;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::GotoDirective;
use workflow_core::HandlerError;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::limits::DEFAULT_GOTO_MAX_CONCURRENT;
use workflow_core::limits::MAX_CONCURRENT_DEFERRED;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::bind::optional_str;
use crate::bind::optional_u64;
use crate::bind::required_str;

fn vld(message: impl Into<String>) -> HandlerError {
    HandlerError::new("VALIDATION_ERROR", message)
}

/// Handles `goto` blocks.
pub struct GotoHandler;

#[async_trait]
impl BlockHandler for GotoHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Goto
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let target = required_str(&block.logic, "goto_target_block_id")?.to_string();
        let defer = block.logic.get("goto_defer").and_then(serde_json::Value::as_bool).unwrap_or(false);
        let max_concurrent = optional_u64(&block.logic, "goto_max_concurrent", u64::from(DEFAULT_GOTO_MAX_CONCURRENT));
        if max_concurrent == 0 || max_concurrent > u64::from(u32::MAX) {
            return Err(vld("goto_max_concurrent must be a positive, finite integer"));
        }
        let max_concurrent = (max_concurrent as u32).min(MAX_CONCURRENT_DEFERRED);
        let loop_name = optional_str(&block.logic, "goto_loop_name").map(str::to_string);
        Ok(BlockResult::Goto(GotoDirective { target, defer, max_concurrent, loop_name }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use workflow_core::context::RunScope;
    use workflow_core::ids::BlockId;
    use workflow_core::ids::RunId;
    use workflow_core::ids::VersionNumber;
    use workflow_core::ids::WorkflowId;
    use workflow_core::model::RunStatus;
    use workflow_core::model::TriggerType;
    use workflow_core::time::Timestamp;

    use super::*;

    fn block(logic: serde_json::Value) -> Block {
        Block {
            id: BlockId::new("b1"),
            workflow_id: WorkflowId::new("w1"),
            workflow_version: VersionNumber::new(1),
            name: "b1".to_string(),
            block_type: BlockType::Goto,
            logic,
            conditions: vec![],
            order: 0,
            notes: None,
        }
    }

    fn ctx() -> WorkflowContext {
        let run = RunScope {
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
        };
        WorkflowContext::new(run, json!({}), BTreeMap::new(), BTreeMap::new())
    }

    #[tokio::test]
    async fn emits_goto_directive_with_defaults() {
        let b = block(json!({"goto_target_block_id": "b2"}));
        let result = GotoHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Goto(directive) = result else { panic!("expected goto") };
        assert_eq!(directive.target, "b2");
        assert!(!directive.defer);
        assert_eq!(directive.max_concurrent, DEFAULT_GOTO_MAX_CONCURRENT);
    }

    #[tokio::test]
    async fn clamps_max_concurrent_to_ceiling() {
        let b = block(json!({"goto_target_block_id": "b2", "goto_max_concurrent": 999}));
        let result = GotoHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Goto(directive) = result else { panic!("expected goto") };
        assert_eq!(directive.max_concurrent, MAX_CONCURRENT_DEFERRED);
    }

    #[tokio::test]
    async fn zero_max_concurrent_is_rejected() {
        let b = block(json!({"goto_target_block_id": "b2", "goto_max_concurrent": 0}));
        let err = GotoHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }
}
