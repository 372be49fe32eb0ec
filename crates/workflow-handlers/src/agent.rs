// workflow-handlers/src/agent.rs
// ============================================================================
// Module: Agent Handler
// Description: LLM invocation block handler.
// Purpose: Call an LLM provider with a resolved prompt, using a workflow
//          secret for the provider credential, and bind its reply.
// Dependencies: reqwest, serde_json, workflow-core
// ============================================================================

//! ## Overview
//! The handler never touches `ctx.secrets` storage directly — the
//! interpreter resolves `agent_api_key_ref` (a `$keys.<name>` reference)
//! before dispatch, so by the time this handler runs `block.logic` already
//! carries the literal credential value. `agent_json_mode` short-circuits
//! the raw text reply through a JSON parse so `validation.rs` (sugar over
//! this handler) can bind a structured verdict.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::HandlerError;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::bind::bind_completion;
use crate::bind::optional_str;
use crate::bind::required_str;

fn vld(message: impl Into<String>) -> HandlerError {
    HandlerError::new("VALIDATION_ERROR", message)
}

/// Endpoint each supported `agent_provider` value maps to.
fn endpoint_for(provider: &str) -> Result<&'static str, HandlerError> {
    match provider {
        "openai" => Ok("https://api.openai.com/v1/chat/completions"),
        "anthropic" => Ok("https://api.anthropic.com/v1/messages"),
        other => Err(vld(format!("unsupported agent_provider: {other}"))),
    }
}

/// Handles `agent` blocks.
pub struct AgentHandler;

#[async_trait]
impl BlockHandler for AgentHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Agent
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        cancel: &CancellationToken,
    ) -> HandlerResult {
        let provider = required_str(&block.logic, "agent_provider")?;
        let endpoint = endpoint_for(provider)?;
        let model = required_str(&block.logic, "agent_model")?;
        let prompt = required_str(&block.logic, "agent_prompt")?;
        let api_key = required_str(&block.logic, "agent_api_key_ref")?;
        let temperature = block.logic.get("agent_temperature").and_then(Value::as_f64).unwrap_or(0.2);
        let max_tokens = block.logic.get("agent_max_tokens").and_then(Value::as_u64).unwrap_or(1024);
        let json_mode = block.logic.get("agent_json_mode").and_then(Value::as_bool).unwrap_or(false);

        let client = reqwest::Client::new();
        let payload = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        if cancel.is_cancelled() {
            return Err(HandlerError::new("CANCELLED", "run cancelled before agent call"));
        }

        let response = client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("agent request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(HandlerError::new("INTERNAL_ERROR", format!("agent provider returned status {}", response.status())));
        }

        let body: Value = response.json().await.map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("agent response was not JSON: {e}")))?;
        let text = extract_reply_text(&body);

        let result = if json_mode {
            serde_json::from_str(&text).map_err(|e| vld(format!("agent_json_mode reply was not valid JSON: {e}")))?
        } else {
            Value::String(text)
        };

        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "agent_bind_value"), result)))
    }
}

/// Reads the assistant reply text out of either OpenAI's or Anthropic's
/// chat-completion response shape.
fn extract_reply_text(body: &Value) -> String {
    if let Some(text) = body.pointer("/choices/0/message/content").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(text) = body.pointer("/content/0/text").and_then(Value::as_str) {
        return text.to_string();
    }
    String::new()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn endpoint_lookup_rejects_unknown_provider() {
        assert!(endpoint_for("openai").is_ok());
        assert!(endpoint_for("anthropic").is_ok());
        assert!(endpoint_for("bogus").is_err());
    }

    #[test]
    fn extracts_openai_shaped_reply() {
        let body = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_reply_text(&body), "hello");
    }

    #[test]
    fn extracts_anthropic_shaped_reply() {
        let body = json!({"content": [{"text": "hi there"}]});
        assert_eq!(extract_reply_text(&body), "hi there");
    }
}
