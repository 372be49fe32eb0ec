// workflow-core/src/resolver.rs
// ============================================================================
// Module: Workflow Reference Resolver
// Description: Dereferences $-prefixed scope references and {{expr}} templates.
// Purpose: Give every block a single, pure, deterministic way to read context.
// Dependencies: serde_json, crate::context
// ============================================================================

//! ## Overview
//! `resolve` is pure: it never mutates [`WorkflowContext`] and two calls with
//! equal inputs return equal outputs. The grammar is intentionally small —
//! one scope lookup plus a dotted/indexed path walk — per the design note
//! that the resolver should be "one function per scope" rather than a
//! general expression language.

use serde_json::Value;

use crate::context::WorkflowContext;

/// Loop-local bindings available while resolving inside a deferred or
/// synchronous goto-loop iteration, plus the currently dispatching block.
#[derive(Debug, Clone, Default)]
pub struct ResolverLocals {
    /// `$item` — the current iteration's bound value.
    pub item: Option<Value>,
    /// `$row` — synonym for `$item` used by table-driven iteration.
    pub row: Option<Value>,
    /// `$index` — the current iteration's zero-based index.
    pub index: Option<u64>,
    /// `$block` — the currently dispatching block, serialized.
    pub block: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses a `$scope(.key|[idx])*` reference. Returns `None` if `s` does not
/// start with `$` or the scope name is empty.
fn parse_reference(s: &str) -> Option<(&str, Vec<PathSegment>)> {
    let rest = s.strip_prefix('$')?;
    let mut chars = rest.char_indices().peekable();
    let scope_end = chars
        .clone()
        .find(|&(_, c)| c == '.' || c == '[')
        .map_or(rest.len(), |(i, _)| i);
    let scope = &rest[..scope_end];
    if scope.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    let mut remainder = &rest[scope_end..];
    while !remainder.is_empty() {
        if let Some(after_dot) = remainder.strip_prefix('.') {
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            let key = &after_dot[..end];
            if key.is_empty() {
                return None;
            }
            segments.push(PathSegment::Key(key.to_string()));
            remainder = &after_dot[end..];
        } else if let Some(after_bracket) = remainder.strip_prefix('[') {
            let end = after_bracket.find(']')?;
            let idx: usize = after_bracket[..end].parse().ok()?;
            segments.push(PathSegment::Index(idx));
            remainder = &after_bracket[end + 1..];
        } else {
            return None;
        }
    }
    Some((scope, segments))
}

/// Returns true if the entire string is exactly one `$scope...` reference
/// (no surrounding text).
fn is_whole_reference(s: &str) -> bool {
    s.starts_with('$') && !s.contains("{{")
}

fn scope_base(scope: &str, ctx: &WorkflowContext, locals: &ResolverLocals) -> Option<Value> {
    match scope {
        "state" => Some(Value::Object(ctx.state.clone().into_iter().collect())),
        "cache" => Some(Value::Object(ctx.cache.clone().into_iter().collect())),
        "secrets" | "keys" => Some(Value::Object(
            ctx.secrets.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect(),
        )),
        "event" => Some(ctx.event.clone()),
        "run" => serde_json::to_value(&ctx.run).ok(),
        "artifacts" => serde_json::to_value(&ctx.artifacts).ok(),
        "loops" => serde_json::to_value(&ctx.loops).ok(),
        "paths" => Some(Value::Object(
            ctx.paths.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect(),
        )),
        "item" => locals.item.clone().or(Some(Value::Null)),
        "row" => locals.row.clone().or(locals.item.clone()).or(Some(Value::Null)),
        "index" => locals.index.map_or(Some(Value::Null), |i| Some(Value::from(i))),
        "block" => locals.block.clone().or(Some(Value::Null)),
        _ => None,
    }
}

fn walk_path(mut value: Value, segments: &[PathSegment]) -> Value {
    for segment in segments {
        value = match (segment, value) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key.as_str()).cloned().unwrap_or(Value::Null),
            (PathSegment::Index(idx), Value::Array(arr)) => arr.get(*idx).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    value
}

/// Dereferences one whole-value `$scope...` reference. Returns the original
/// string unresolved if the scope name is unknown.
fn resolve_reference(s: &str, ctx: &WorkflowContext, locals: &ResolverLocals) -> Value {
    let Some((scope, segments)) = parse_reference(s) else {
        return Value::String(s.to_string());
    };
    let Some(base) = scope_base(scope, ctx, locals) else {
        return Value::String(s.to_string());
    };
    walk_path(base, &segments)
}

/// Renders a resolved value into interpolation text for `{{expr}}` templates.
fn to_interp_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Resolves every `{{expr}}` segment inside a template string, always
/// producing a string.
fn resolve_template(s: &str, ctx: &WorkflowContext, locals: &ResolverLocals) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        let Some(start) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            break;
        };
        let expr = after_open[..end].trim();
        let resolved = resolve(&Value::String(expr.to_string()), ctx, locals);
        out.push_str(&to_interp_string(&resolved));
        rest = &after_open[end + 2..];
    }
    out
}

/// Resolves `expr` against `ctx` and `locals`.
///
/// - Non-string primitives are returned unchanged.
/// - A string that is wholly one `$scope...` reference returns the
///   dereferenced value, of any type.
/// - A string containing `{{expr}}` segments has each segment resolved and
///   interpolated; the result is always a string.
/// - Objects and arrays are resolved element-wise, structure preserved.
#[must_use]
pub fn resolve(expr: &Value, ctx: &WorkflowContext, locals: &ResolverLocals) -> Value {
    match expr {
        Value::String(s) => {
            if is_whole_reference(s) {
                resolve_reference(s, ctx, locals)
            } else if s.contains("{{") {
                Value::String(resolve_template(s, ctx, locals))
            } else {
                Value::String(s.clone())
            }
        }
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), resolve(v, ctx, locals))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx, locals)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::context::RunScope;
    use crate::ids::RunId;
    use crate::ids::VersionNumber;
    use crate::ids::WorkflowId;
    use crate::model::RunStatus;
    use crate::model::TriggerType;
    use crate::time::Timestamp;
    use serde_json::json;
    use std::collections::BTreeMap;

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
    fn primitive_passes_through_unchanged() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let locals = ResolverLocals::default();
        assert_eq!(resolve(&json!(42), &ctx, &locals), json!(42));
        assert_eq!(resolve(&json!(true), &ctx, &locals), json!(true));
        assert_eq!(resolve(&json!(null), &ctx, &locals), json!(null));
    }

    #[test]
    fn whole_reference_dereferences_any_type() {
        let mut state = serde_json::Map::new();
        state.insert("r".to_string(), json!({"body": {"name": "Ada"}}));
        let ctx = ctx_with_state(state);
        let locals = ResolverLocals::default();
        let resolved = resolve(&json!("$state.r.body.name"), &ctx, &locals);
        assert_eq!(resolved, json!("Ada"));
    }

    #[test]
    fn missing_path_yields_null_not_error() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let locals = ResolverLocals::default();
        let resolved = resolve(&json!("$state.missing.nested"), &ctx, &locals);
        assert_eq!(resolved, Value::Null);
    }

    #[test]
    fn unknown_scope_yields_original_string() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let locals = ResolverLocals::default();
        let resolved = resolve(&json!("$bogus.thing"), &ctx, &locals);
        assert_eq!(resolved, json!("$bogus.thing"));
    }

    #[test]
    fn template_interpolation_always_yields_string() {
        let mut state = serde_json::Map::new();
        state.insert("r".to_string(), json!({"body": {"name": "Ada"}}));
        let ctx = ctx_with_state(state);
        let locals = ResolverLocals::default();
        let resolved = resolve(&json!("hi {{$state.r.body.name}}"), &ctx, &locals);
        assert_eq!(resolved, json!("hi Ada"));
    }

    #[test]
    fn resolver_is_idempotent_for_present_scopes() {
        let mut state = serde_json::Map::new();
        state.insert("x".to_string(), json!(7));
        let ctx = ctx_with_state(state);
        let locals = ResolverLocals::default();
        let once = resolve(&json!("$state.x"), &ctx, &locals);
        let twice = resolve(&once, &ctx, &locals);
        assert_eq!(once, twice);
    }

    #[test]
    fn object_and_array_resolve_element_wise() {
        let mut state = serde_json::Map::new();
        state.insert("x".to_string(), json!(7));
        let ctx = ctx_with_state(state);
        let locals = ResolverLocals::default();
        let input = json!({"a": "$state.x", "b": [1, "$state.x", "plain"]});
        let resolved = resolve(&input, &ctx, &locals);
        assert_eq!(resolved, json!({"a": 7, "b": [1, 7, "plain"]}));
    }

    #[test]
    fn loop_locals_resolve_item_row_index() {
        let ctx = ctx_with_state(serde_json::Map::new());
        let locals = ResolverLocals {
            item: Some(json!({"id": 1})),
            row: None,
            index: Some(3),
            block: None,
        };
        assert_eq!(resolve(&json!("$item.id"), &ctx, &locals), json!(1));
        assert_eq!(resolve(&json!("$row.id"), &ctx, &locals), json!(1));
        assert_eq!(resolve(&json!("$index"), &ctx, &locals), json!(3));
    }
}
