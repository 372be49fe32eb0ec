// workflow-handlers/src/code.rs
// ============================================================================
// Module: Code Handler
// Description: Sandboxed arithmetic/string expression evaluator.
// Purpose: Let a workflow author compute a derived value from context reads
//          without handing the interpreter a general-purpose scripting
//          engine, filesystem access, or network access.
// Dependencies: workflow-core
// ============================================================================

//! ## Overview
//! No scripting-engine crate is part of this workspace's dependency set, so
//! `code_expression` is evaluated by a small recursive-descent parser over
//! `+ - * / ( )`, numeric and quoted-string literals, and `$scope.path`
//! references resolved through [`workflow_core::resolve`]. This is
//! deliberately not Turing-complete: no loops, no function calls, no
//! assignment. Anything more expressive belongs in a future dedicated
//! scripting block type, not here.

use async_trait::async_trait;
use serde_json::Value;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::HandlerError;
use workflow_core::HandlerResult;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::model::Block;
use workflow_core::model::BlockType;
use workflow_core::resolve;

use crate::bind::bind_completion;
use crate::bind::optional_str;
use crate::bind::required_str;

fn vld(message: impl Into<String>) -> HandlerError {
    HandlerError::new("VALIDATION_ERROR", message)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ref(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, HandlerError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let Some(end) = chars[start..].iter().position(|&c| c == '"') else {
                    return Err(vld("unterminated string literal in code_expression"));
                };
                tokens.push(Token::Str(chars[start..start + end].iter().collect()));
                i = start + end + 1;
            }
            '$' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '.' | '_' | '[' | ']')) {
                    i += 1;
                }
                tokens.push(Token::Ref(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value: f64 = text.parse().map_err(|_| vld(format!("invalid number literal: {text}")))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(vld(format!("unexpected character in code_expression: {other}"))),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ctx: &'a WorkflowContext,
    locals: &'a ResolverLocals,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn parse_expr(&mut self) -> Result<Value, HandlerError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = add(left, right)?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = Value::from(as_number(&left)? - as_number(&right)?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Value, HandlerError> {
        let mut left = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let right = self.parse_factor()?;
                    left = Value::from(as_number(&left)? * as_number(&right)?);
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_factor()?;
                    let divisor = as_number(&right)?;
                    if divisor == 0.0 {
                        return Err(vld("division by zero in code_expression"));
                    }
                    left = Value::from(as_number(&left)? / divisor);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Value, HandlerError> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(Value::from(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Ref(reference)) => Ok(resolve(&Value::String(reference), self.ctx, self.locals)),
            Some(Token::Minus) => Ok(Value::from(-as_number(&self.parse_factor()?)?)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(vld("missing closing parenthesis in code_expression")),
                }
            }
            other => Err(vld(format!("unexpected token in code_expression: {other:?}"))),
        }
    }
}

fn as_number(value: &Value) -> Result<f64, HandlerError> {
    value.as_f64().ok_or_else(|| vld("code_expression operand is not numeric"))
}

fn add(left: Value, right: Value) -> Result<Value, HandlerError> {
    match (&left, &right) {
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!("{}{}", to_text(&left), to_text(&right)))),
        _ => Ok(Value::from(as_number(&left)? + as_number(&right)?)),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Evaluates `src` against `ctx`/`locals`, returning the computed [`Value`].
///
/// # Errors
/// Returns `VALIDATION_ERROR` on malformed syntax, unknown operators, or a
/// non-numeric operand to an arithmetic operator.
fn evaluate(src: &str, ctx: &WorkflowContext, locals: &ResolverLocals) -> Result<Value, HandlerError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, ctx, locals };
    let result = parser.parse_expr()?;
    if parser.pos != tokens.len() {
        return Err(vld("trailing tokens after code_expression"));
    }
    Ok(result)
}

/// Handles `code` blocks.
pub struct CodeHandler;

#[async_trait]
impl BlockHandler for CodeHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Code
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let source = required_str(&block.logic, "code_expression")?;
        let result = evaluate(source, ctx, locals)?;
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "code_bind_value"), result)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use workflow_core::context::RunScope;
    use workflow_core::ids::RunId;
    use workflow_core::ids::VersionNumber;
    use workflow_core::ids::WorkflowId;
    use workflow_core::model::RunStatus;
    use workflow_core::model::TriggerType;
    use workflow_core::time::Timestamp;

    use super::*;

    fn ctx_with_state(state: serde_json::Map<String, Value>) -> WorkflowContext {
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
        let mut ctx = WorkflowContext::new(run, json!({}), BTreeMap::new(), BTreeMap::new());
        ctx.state = state.into_iter().collect();
        ctx
    }

    #[test]
    fn arithmetic_with_precedence() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let result = evaluate("2 + 3 * 4", &ctx, &ResolverLocals::default()).unwrap();
        assert_eq!(result, json!(14.0));
    }

    #[test]
    fn parentheses_override_precedence() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let result = evaluate("(2 + 3) * 4", &ctx, &ResolverLocals::default()).unwrap();
        assert_eq!(result, json!(20.0));
    }

    #[test]
    fn state_reference_resolves_inline() {
        let mut state = serde_json::Map::new();
        state.insert("count".to_string(), json!(5));
        let ctx = ctx_with_state(state);
        let result = evaluate("$state.count + 1", &ctx, &ResolverLocals::default()).unwrap();
        assert_eq!(result, json!(6.0));
    }

    #[test]
    fn division_by_zero_fails_closed() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let err = evaluate("1 / 0", &ctx, &ResolverLocals::default()).unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }

    #[test]
    fn string_concatenation_via_plus() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let result = evaluate(r#""a" + "b""#, &ctx, &ResolverLocals::default()).unwrap();
        assert_eq!(result, json!("ab"));
    }
}
