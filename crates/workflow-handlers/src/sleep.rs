// workflow-handlers/src/sleep.rs
// ============================================================================
// Module: Sleep Handler
// Description: Cancellable, bounded-duration pause handler.
// Purpose: Let a workflow author delay execution without blocking the
//          interpreter's cancellation or run-timeout machinery.
// Dependencies: tokio, workflow-core
// ============================================================================

//! ## Overview
//! Sleeps are raced against the run's [`CancellationToken`] rather than
//! awaited unconditionally, so a cancelled run does not wait out a long
//! sleep block before observing cancellation.

use async_trait::async_trait;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::HandlerError;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::limits::MAX_SLEEP_DURATION_MS;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::bind::optional_u64;

/// Handles `sleep` blocks.
pub struct SleepHandler;

#[async_trait]
impl BlockHandler for SleepHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Sleep
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        cancel: &CancellationToken,
    ) -> HandlerResult {
        let requested = optional_u64(&block.logic, "sleep_duration_ms", 0);
        if requested > MAX_SLEEP_DURATION_MS {
            return Err(HandlerError::new(
                "VALIDATION_ERROR",
                format!("sleep_duration_ms {requested} exceeds MAX_SLEEP_DURATION_MS ({MAX_SLEEP_DURATION_MS})"),
            ));
        }
        tokio::select! {
            () = tokio::time::sleep(std::time::Duration::from_millis(requested)) => {}
            () = cancel.cancelled() => return Err(HandlerError::new("CANCELLED", "run cancelled during sleep")),
        }
        Ok(BlockResult::empty_completion())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use serde_json::json;
    use std::collections::BTreeMap;
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
            block_type: BlockType::Sleep,
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
    async fn sleeps_for_requested_duration() {
        let b = block(json!({"sleep_duration_ms": 5}));
        let result = SleepHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result, BlockResult::empty_completion());
    }

    #[tokio::test]
    async fn rejects_duration_above_ceiling() {
        let b = block(json!({"sleep_duration_ms": MAX_SLEEP_DURATION_MS + 1}));
        let err = SleepHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn cancellation_interrupts_sleep() {
        let b = block(json!({"sleep_duration_ms": 60_000}));
        let cancel = CancellationToken::new();
        let waiter = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            waiter.cancel();
        });
        let err = SleepHandler.handle(&b, &ctx(), &ResolverLocals::default(), &cancel).await.unwrap_err();
        assert_eq!(err.kind, "CANCELLED");
    }
}
