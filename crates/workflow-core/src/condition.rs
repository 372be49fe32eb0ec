// workflow-core/src/condition.rs
// ============================================================================
// Module: Workflow Condition Evaluator
// Description: AND-gated guard predicate evaluation for block dispatch.
// Purpose: Decide whether a block's conditions permit dispatch.
// Dependencies: regex, serde_json, crate::{context, model, resolver}
// ============================================================================

//! ## Overview
//! Every operand is routed through the reference resolver before
//! comparison. Coercion failures and regex compile failures resolve to
//! `false` rather than propagating an error — a guard that cannot be
//! evaluated is conservatively treated as not satisfied, never as a fault.

use serde_json::Value;

use crate::context::WorkflowContext;
use crate::model::Condition;
use crate::model::ConditionOperator;
use crate::resolver::ResolverLocals;
use crate::resolver::resolve;

/// Evaluates an ordered, AND-gated list of conditions against `ctx`.
///
/// An empty or absent list is vacuously `true`. Deterministic in
/// `(conditions, ctx)`.
#[must_use]
pub fn evaluate(conditions: &[Condition], ctx: &WorkflowContext, locals: &ResolverLocals) -> bool {
    conditions.iter().all(|condition| evaluate_one(condition, ctx, locals))
}

fn evaluate_one(condition: &Condition, ctx: &WorkflowContext, locals: &ResolverLocals) -> bool {
    let left = resolve(&condition.left, ctx, locals);
    let right = condition.right.as_ref().map(|r| resolve(r, ctx, locals));
    match condition.operator {
        ConditionOperator::Eq => right.is_some_and(|r| values_equal(&left, &r)),
        ConditionOperator::Ne => right.is_some_and(|r| !values_equal(&left, &r)),
        ConditionOperator::Lt => compare_numeric(&left, right.as_ref(), |a, b| a < b),
        ConditionOperator::Gt => compare_numeric(&left, right.as_ref(), |a, b| a > b),
        ConditionOperator::Lte => compare_numeric(&left, right.as_ref(), |a, b| a <= b),
        ConditionOperator::Gte => compare_numeric(&left, right.as_ref(), |a, b| a >= b),
        ConditionOperator::Contains => right.is_some_and(|r| contains(&left, &r)),
        ConditionOperator::StartsWith => right.is_some_and(|r| string_edge(&left, &r, str::starts_with)),
        ConditionOperator::EndsWith => right.is_some_and(|r| string_edge(&left, &r, str::ends_with)),
        ConditionOperator::In => right.is_some_and(|r| in_sequence(&left, &r)),
        ConditionOperator::IsEmpty => is_empty(&left),
        ConditionOperator::IsFalsy => is_falsy(&left),
        ConditionOperator::IsNull => left.is_null(),
        ConditionOperator::Regex => right.is_some_and(|r| regex_match(&left, &r)),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    left == right
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare_numeric(left: &Value, right: Option<&Value>, op: impl Fn(f64, f64) -> bool) -> bool {
    let Some(right) = right else { return false };
    match (as_f64(left), as_f64(right)) {
        (Some(l), Some(r)) => op(l, r),
        _ => false,
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(s) => match right {
            Value::String(needle) => s.contains(needle.as_str()),
            _ => false,
        },
        Value::Array(items) => items.contains(right),
        Value::Object(map) => match right {
            Value::String(key) => map.contains_key(key.as_str()),
            _ => false,
        },
        _ => false,
    }
}

fn string_edge(left: &Value, right: &Value, op: impl Fn(&str, &str) -> bool) -> bool {
    match (left, right) {
        (Value::String(l), Value::String(r)) => op(l.as_str(), r.as_str()),
        _ => false,
    }
}

fn in_sequence(left: &Value, right: &Value) -> bool {
    match right {
        Value::Array(items) => items.contains(left),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn regex_match(left: &Value, pattern: &Value) -> bool {
    let (Value::String(haystack), Value::String(pattern)) = (left, pattern) else {
        return false;
    };
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(haystack),
        Err(_) => false,
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
        WorkflowContext::new(run, json!({"go": "no"}), BTreeMap::new(), BTreeMap::new())
    }

    fn cond(left: Value, op: ConditionOperator, right: Option<Value>) -> Condition {
        Condition { left, operator: op, right }
    }

    #[test]
    fn empty_condition_list_is_true() {
        assert!(evaluate(&[], &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn equality_condition_from_spec_scenario() {
        let conditions = vec![cond(json!("$event.go"), ConditionOperator::Eq, Some(json!("yes")))];
        assert!(!evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn numeric_coercion_failure_returns_false_not_error() {
        let conditions = vec![cond(json!("not-a-number"), ConditionOperator::Lt, Some(json!(5)))];
        assert!(!evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn regex_compile_failure_returns_false() {
        let conditions = vec![cond(json!("abc"), ConditionOperator::Regex, Some(json!("(")))];
        assert!(!evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn regex_match_succeeds_on_valid_pattern() {
        let conditions = vec![cond(json!("abc123"), ConditionOperator::Regex, Some(json!(r"^[a-z]+\d+$")))];
        assert!(evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn and_gating_requires_every_predicate() {
        let conditions = vec![
            cond(json!(1), ConditionOperator::Eq, Some(json!(1))),
            cond(json!(1), ConditionOperator::Eq, Some(json!(2))),
        ];
        assert!(!evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }

    #[test]
    fn is_empty_and_is_falsy_and_is_null() {
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_falsy(&json!(0)));
        assert!(is_falsy(&json!(false)));
        assert!(!is_falsy(&json!("x")));
    }

    #[test]
    fn in_operator_checks_membership() {
        let conditions = vec![cond(json!("b"), ConditionOperator::In, Some(json!(["a", "b", "c"])))];
        assert!(evaluate(&conditions, &ctx(), &ResolverLocals::default()));
    }
}
