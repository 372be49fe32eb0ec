// workflow-handlers/src/validation.rs
// ============================================================================
// Module: Validation Handler
// Description: Sugar block type over `agent`, fixed to agent_type = "validation".
// Purpose: Let authors express an LLM-backed pass/fail check without
//          repeating the full agent schema.
// Dependencies: workflow-core, crate::agent
// ============================================================================

//! ## Overview
//! Rewrites `validation_*` logic fields to their `agent_*` counterparts and
//! delegates to [`crate::agent::AgentHandler`], forcing `agent_json_mode` so
//! the reply binds as a structured `{passed, reason}` verdict rather than
//! free text.

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use workflow_core::BlockHandler;
use workflow_core::CancellationToken;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::agent::AgentHandler;

/// Handles `validation` blocks by delegating to [`AgentHandler`].
pub struct ValidationHandler;

#[async_trait]
impl BlockHandler for ValidationHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Validation
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        locals: &ResolverLocals,
        cancel: &CancellationToken,
    ) -> HandlerResult {
        let rewritten = rewrite_as_agent_logic(&block.logic);
        let agent_block = Block { logic: rewritten, block_type: BlockType::Agent, ..block.clone() };
        AgentHandler.handle(&agent_block, ctx, locals, cancel).await
    }
}

fn rewrite_as_agent_logic(logic: &Value) -> Value {
    let Value::Object(map) = logic else {
        return logic.clone();
    };
    let mut out = Map::new();
    for (key, value) in map {
        let renamed = key.strip_prefix("validation_").map_or_else(|| key.clone(), |rest| format!("agent_{rest}"));
        out.insert(renamed, value.clone());
    }
    out.entry("agent_json_mode").or_insert(Value::Bool(true));
    Value::Object(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renames_validation_prefix_to_agent() {
        let logic = json!({"validation_provider": "openai", "validation_prompt": "check it"});
        let rewritten = rewrite_as_agent_logic(&logic);
        assert_eq!(rewritten["agent_provider"], "openai");
        assert_eq!(rewritten["agent_prompt"], "check it");
        assert_eq!(rewritten["agent_json_mode"], json!(true));
    }

    #[test]
    fn explicit_json_mode_is_not_overridden() {
        let logic = json!({"validation_provider": "openai", "validation_json_mode": false});
        let rewritten = rewrite_as_agent_logic(&logic);
        assert_eq!(rewritten["agent_json_mode"], json!(false));
    }
}
