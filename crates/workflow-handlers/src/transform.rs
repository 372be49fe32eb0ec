// workflow-handlers/src/transform.rs
// ============================================================================
// Module: Pure Data Transform Handlers
// Description: object/string/array/math/date/normalize block handlers.
// Purpose: Implement the "pure data transforms" catalogue entry — each
// accepts a `<type>_operation` discriminator and produces a typed
// result bound via `<type>_bind_value`.
// Dependencies: serde_json, time, workflow-core
// ============================================================================

//! ## Overview
//! These six handlers never perform I/O and never fail on missing optional
//! fields — unknown operations and type-mismatched operands map to a
//! `VALIDATION_ERROR` [`HandlerError`], the only failure mode pure
//! transforms have. Each handler is intentionally small: a `match` over its
//! operation discriminator, one function per arm.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
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

// ============================================================================
// SECTION: object
// ============================================================================

/// Handles `object` blocks: `set | merge | pick | omit | get`.
pub struct ObjectHandler;

#[async_trait]
impl BlockHandler for ObjectHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Object
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "object_operation")?;
        let input = block.logic.get("object_input").cloned().unwrap_or(Value::Null);
        let result = match op {
            "set" => {
                let Value::Object(mut map) = input else {
                    return Err(vld("object set requires object_input to be an object"));
                };
                let key = required_str(&block.logic, "object_key")?;
                let value = block.logic.get("object_value").cloned().unwrap_or(Value::Null);
                map.insert(key.to_string(), value);
                Value::Object(map)
            }
            "merge" => {
                let Value::Object(mut map) = input else {
                    return Err(vld("object merge requires object_input to be an object"));
                };
                let Some(Value::Object(patch)) = block.logic.get("object_patch").cloned() else {
                    return Err(vld("object merge requires object_patch to be an object"));
                };
                map.extend(patch);
                Value::Object(map)
            }
            "pick" => {
                let Value::Object(map) = input else {
                    return Err(vld("object pick requires object_input to be an object"));
                };
                let keys = block.logic.get("object_keys").and_then(Value::as_array).cloned().unwrap_or_default();
                let mut picked = serde_json::Map::new();
                for key in &keys {
                    if let Some(key) = key.as_str()
                        && let Some(value) = map.get(key)
                    {
                        picked.insert(key.to_string(), value.clone());
                    }
                }
                Value::Object(picked)
            }
            "omit" => {
                let Value::Object(map) = input else {
                    return Err(vld("object omit requires object_input to be an object"));
                };
                let keys: Vec<String> = block
                    .logic
                    .get("object_keys")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
                    .unwrap_or_default();
                let mut remaining = map;
                for key in &keys {
                    remaining.remove(key);
                }
                Value::Object(remaining)
            }
            "get" => {
                let key = required_str(&block.logic, "object_key")?;
                input.get(key).cloned().unwrap_or(Value::Null)
            }
            other => return Err(vld(format!("unsupported object_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "object_bind_value"), result)))
    }
}

// ============================================================================
// SECTION: string
// ============================================================================

/// Handles `string` blocks: `template | replace | split | trim | uppercase |
/// lowercase | concat`.
pub struct StringHandler;

#[async_trait]
impl BlockHandler for StringHandler {
    fn block_type(&self) -> BlockType {
        BlockType::String
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "string_operation")?;
        let result = match op {
            // By the time the handler runs, the interpreter has already
            // resolved `{{expr}}` segments in `string_template` — this
            // handler just passes the already-rendered text through.
            "template" => Value::String(required_str(&block.logic, "string_template")?.to_string()),
            "replace" => {
                let input = required_str(&block.logic, "string_input")?;
                let from = required_str(&block.logic, "string_from")?;
                let to = required_str(&block.logic, "string_to")?;
                Value::String(input.replace(from, to))
            }
            "split" => {
                let input = required_str(&block.logic, "string_input")?;
                let sep = optional_str(&block.logic, "string_separator").unwrap_or(",");
                Value::Array(input.split(sep).map(|s| Value::String(s.to_string())).collect())
            }
            "trim" => Value::String(required_str(&block.logic, "string_input")?.trim().to_string()),
            "uppercase" => Value::String(required_str(&block.logic, "string_input")?.to_uppercase()),
            "lowercase" => Value::String(required_str(&block.logic, "string_input")?.to_lowercase()),
            "concat" => {
                let parts = block.logic.get("string_parts").and_then(Value::as_array).cloned().unwrap_or_default();
                let joined: String = parts.iter().map(value_as_text).collect();
                Value::String(joined)
            }
            other => return Err(vld(format!("unsupported string_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "string_bind_value"), result)))
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: array
// ============================================================================

/// Handles `array` blocks: `map | filter | reduce | join | length | sort |
/// unique`. `map`/`filter`/`reduce` operate over already-resolved literal
/// element values (no embedded expression language beyond what the
/// interpreter's reference resolver already applied to `array_input`).
pub struct ArrayHandler;

#[async_trait]
impl BlockHandler for ArrayHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Array
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "array_operation")?;
        let Some(Value::Array(input)) = block.logic.get("array_input").cloned() else {
            return Err(vld("array operation requires array_input to be an array"));
        };
        let result = match op {
            "filter" => {
                let field = optional_str(&block.logic, "array_filter_field");
                let expected = block.logic.get("array_filter_value");
                Value::Array(
                    input
                        .into_iter()
                        .filter(|item| match (field, expected) {
                            (Some(field), Some(expected)) => item.get(field) == Some(expected),
                            _ => true,
                        })
                        .collect(),
                )
            }
            "map" => {
                let field = optional_str(&block.logic, "array_map_field");
                Value::Array(
                    input
                        .into_iter()
                        .map(|item| field.map_or_else(|| item.clone(), |field| item.get(field).cloned().unwrap_or(Value::Null)))
                        .collect(),
                )
            }
            "reduce" => {
                let field = optional_str(&block.logic, "array_reduce_field");
                let sum: f64 = input
                    .iter()
                    .filter_map(|item| {
                        let scalar = field.map_or_else(|| Some(item.clone()), |field| item.get(field).cloned());
                        scalar.and_then(|v| v.as_f64())
                    })
                    .sum();
                json!(sum)
            }
            "join" => {
                let sep = optional_str(&block.logic, "array_separator").unwrap_or(",");
                Value::String(input.iter().map(value_as_text).collect::<Vec<_>>().join(sep))
            }
            "length" => json!(input.len()),
            "sort" => {
                let mut items = input;
                items.sort_by(|a, b| {
                    a.as_f64().zip(b.as_f64()).map_or_else(
                        || value_as_text(a).cmp(&value_as_text(b)),
                        |(a, b)| a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
                    )
                });
                Value::Array(items)
            }
            "unique" => {
                let mut seen = Vec::new();
                for item in input {
                    if !seen.contains(&item) {
                        seen.push(item);
                    }
                }
                Value::Array(seen)
            }
            other => return Err(vld(format!("unsupported array_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "array_bind_value"), result)))
    }
}

// ============================================================================
// SECTION: math
// ============================================================================

/// Handles `math` blocks: `add | subtract | multiply | divide | increment |
/// round | min | max`.
pub struct MathHandler;

#[async_trait]
impl BlockHandler for MathHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Math
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "math_operation")?;
        let a = block.logic.get("math_a").and_then(Value::as_f64);
        let b = block.logic.get("math_b").and_then(Value::as_f64);
        let result = match op {
            "add" => json!(require_operand(a, "math_a")? + require_operand(b, "math_b")?),
            "subtract" => json!(require_operand(a, "math_a")? - require_operand(b, "math_b")?),
            "multiply" => json!(require_operand(a, "math_a")? * require_operand(b, "math_b")?),
            "divide" => {
                let divisor = require_operand(b, "math_b")?;
                if divisor == 0.0 {
                    return Err(vld("math divide by zero"));
                }
                json!(require_operand(a, "math_a")? / divisor)
            }
            "increment" => json!(a.unwrap_or(0.0) + 1.0),
            "round" => json!(require_operand(a, "math_a")?.round()),
            "min" => json!(require_operand(a, "math_a")?.min(require_operand(b, "math_b")?)),
            "max" => json!(require_operand(a, "math_a")?.max(require_operand(b, "math_b")?)),
            other => return Err(vld(format!("unsupported math_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "math_bind_value"), result)))
    }
}

fn require_operand(value: Option<f64>, field: &str) -> Result<f64, HandlerError> {
    value.ok_or_else(|| vld(format!("missing or non-numeric field: {field}")))
}

// ============================================================================
// SECTION: date
// ============================================================================

/// Handles `date` blocks: `now | format | add | diff`.
pub struct DateHandler;

#[async_trait]
impl BlockHandler for DateHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Date
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "date_operation")?;
        let result = match op {
            "now" => Value::String(OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| vld(e.to_string()))?),
            "format" => {
                let input = required_str(&block.logic, "date_input")?;
                let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|e| vld(e.to_string()))?;
                Value::String(parsed.format(&Rfc3339).map_err(|e| vld(e.to_string()))?)
            }
            "add" => {
                let input = required_str(&block.logic, "date_input")?;
                let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|e| vld(e.to_string()))?;
                let seconds = block.logic.get("date_add_seconds").and_then(Value::as_i64).unwrap_or(0);
                let shifted = parsed + time::Duration::seconds(seconds);
                Value::String(shifted.format(&Rfc3339).map_err(|e| vld(e.to_string()))?)
            }
            "diff" => {
                let from = OffsetDateTime::parse(required_str(&block.logic, "date_from")?, &Rfc3339)
                    .map_err(|e| vld(e.to_string()))?;
                let to = OffsetDateTime::parse(required_str(&block.logic, "date_to")?, &Rfc3339)
                    .map_err(|e| vld(e.to_string()))?;
                json!((to - from).whole_milliseconds())
            }
            other => return Err(vld(format!("unsupported date_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "date_bind_value"), result)))
    }
}

// ============================================================================
// SECTION: normalize
// ============================================================================

/// Handles `normalize` blocks: reshapes an arbitrary input against a flat
/// `{field: default}` schema, filling absent fields with their declared
/// default rather than failing.
pub struct NormalizeHandler;

#[async_trait]
impl BlockHandler for NormalizeHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Normalize
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let op = required_str(&block.logic, "normalize_operation")?;
        let input = block.logic.get("normalize_input").cloned().unwrap_or(Value::Null);
        let result = match op {
            "shape" => {
                let Some(Value::Object(schema)) = block.logic.get("normalize_schema").cloned() else {
                    return Err(vld("normalize shape requires normalize_schema to be an object"));
                };
                let source = if let Value::Object(map) = &input { Some(map) } else { None };
                let mut out = serde_json::Map::new();
                for (field, default) in schema {
                    let value = source.and_then(|m| m.get(&field)).cloned().unwrap_or(default);
                    out.insert(field, value);
                }
                Value::Object(out)
            }
            "flatten" => {
                let mut out = serde_json::Map::new();
                flatten_into(&input, String::new(), &mut out);
                Value::Object(out)
            }
            other => return Err(vld(format!("unsupported normalize_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "normalize_bind_value"), result)))
    }
}

fn flatten_into(value: &Value, prefix: String, out: &mut serde_json::Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let next_prefix = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(value, next_prefix, out);
            }
        }
        other => {
            out.insert(prefix, other.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use workflow_core::context::RunScope;
    use workflow_core::ids::BlockId;
    use workflow_core::ids::RunId;
    use workflow_core::ids::VersionNumber;
    use workflow_core::ids::WorkflowId;
    use workflow_core::model::RunStatus;
    use workflow_core::model::TriggerType;
    use workflow_core::time::Timestamp;

    fn block(block_type: BlockType, logic: Value) -> Block {
        Block {
            id: BlockId::new("b1"),
            workflow_id: WorkflowId::new("w1"),
            workflow_version: VersionNumber::new(1),
            name: "b1".to_string(),
            block_type,
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
        WorkflowContext::new(run, json!({}), std::collections::BTreeMap::new(), std::collections::BTreeMap::new())
    }

    #[tokio::test]
    async fn object_merge_overwrites_colliding_keys() {
        let b = block(
            BlockType::Object,
            json!({"object_operation": "merge", "object_input": {"a": 1}, "object_patch": {"a": 2, "b": 3}, "object_bind_value": "out"}),
        );
        let result = ObjectHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Completed(completion) = result else { panic!("expected completion") };
        assert_eq!(completion.state_delta["out"], json!({"a": 2, "b": 3}));
    }

    #[tokio::test]
    async fn string_template_passes_through_resolved_text() {
        let b = block(BlockType::String, json!({"string_operation": "template", "string_template": "hi Ada", "string_bind_value": "greeting"}));
        let result = StringHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Completed(completion) = result else { panic!("expected completion") };
        assert_eq!(completion.state_delta["greeting"], json!("hi Ada"));
    }

    #[tokio::test]
    async fn math_divide_by_zero_fails_closed() {
        let b = block(BlockType::Math, json!({"math_operation": "divide", "math_a": 1, "math_b": 0}));
        let err = MathHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn array_filter_keeps_matching_elements() {
        let b = block(
            BlockType::Array,
            json!({"array_operation": "filter", "array_input": [{"k": 1}, {"k": 2}], "array_filter_field": "k", "array_filter_value": 2, "array_bind_value": "out"}),
        );
        let result = ArrayHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Completed(completion) = result else { panic!("expected completion") };
        assert_eq!(completion.state_delta["out"], json!([{"k": 2}]));
    }

    #[tokio::test]
    async fn normalize_shape_fills_missing_defaults() {
        let b = block(
            BlockType::Normalize,
            json!({"normalize_operation": "shape", "normalize_input": {"a": 1}, "normalize_schema": {"a": 0, "b": "none"}, "normalize_bind_value": "out"}),
        );
        let result = NormalizeHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Completed(completion) = result else { panic!("expected completion") };
        assert_eq!(completion.state_delta["out"], json!({"a": 1, "b": "none"}));
    }
}
