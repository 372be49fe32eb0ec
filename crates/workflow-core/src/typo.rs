// workflow-core/src/typo.rs
// ============================================================================
// Module: Logic Field Typo Tolerance
// Description: Per-block-type table mapping a commonly misnamed logic field
// to its canonical name.
// Purpose: Apply "commonMistakes" rewrites before dispatch.
// Dependencies: serde_json, crate::model
// ============================================================================

//! ## Overview
//! Authors occasionally write `fetch_timeout` instead of `fetch_timeout_ms`,
//! or `goto_target` instead of `goto_target_block_id`. Validation rewrites
//! these before the logic reaches a handler, rather than rejecting the
//! block or silently ignoring the field.

use serde_json::Value;

use crate::model::BlockType;

/// Returns the `(mistaken, canonical)` field-name pairs for `block_type`.
#[must_use]
pub fn common_mistakes(block_type: BlockType) -> &'static [(&'static str, &'static str)] {
    match block_type {
        BlockType::Fetch => &[
            ("fetch_timeout", "fetch_timeout_ms"),
            ("fetch_retries", "fetch_max_retries"),
            ("fetch_retry_delay", "fetch_retry_delay_ms"),
            ("fetch_backoff", "fetch_backoff_multiplier"),
            ("fetch_status_codes", "fetch_accepted_status_codes"),
            ("fetch_bind", "fetch_bind_value"),
        ],
        BlockType::Goto => &[
            ("goto_target", "goto_target_block_id"),
            ("goto_target_id", "goto_target_block_id"),
            ("goto_max_concurrency", "goto_max_concurrent"),
            ("goto_loop", "goto_loop_name"),
        ],
        BlockType::Sleep => &[("sleep_ms", "sleep_duration_ms"), ("sleep_duration", "sleep_duration_ms")],
        BlockType::Agent => &[
            ("agent_prompt_template", "agent_prompt"),
            ("agent_json", "agent_json_mode"),
            ("agent_bind", "agent_bind_value"),
        ],
        BlockType::Validation => &[
            ("validation_prompt_template", "validation_prompt"),
            ("validation_bind", "validation_bind_value"),
        ],
        BlockType::Object => &[("object_op", "object_operation"), ("object_bind", "object_bind_value")],
        BlockType::String => &[("string_op", "string_operation"), ("string_bind", "string_bind_value")],
        BlockType::Array => &[("array_op", "array_operation"), ("array_bind", "array_bind_value")],
        BlockType::Math => &[("math_op", "math_operation"), ("math_bind", "math_bind_value")],
        BlockType::Date => &[("date_op", "date_operation"), ("date_bind", "date_bind_value")],
        BlockType::Normalize => {
            &[("normalize_op", "normalize_operation"), ("normalize_bind", "normalize_bind_value")]
        }
        BlockType::Code => &[("code_src", "code_source"), ("code_bind", "code_bind_value")],
        BlockType::UiForm => &[("ui_form_bind", "ui_form_bind_value"), ("form_fields", "ui_form_fields")],
        BlockType::UiCamera => &[("ui_camera_bind", "ui_camera_bind_value")],
        BlockType::UiTable => &[("ui_table_bind", "ui_table_bind_value")],
        BlockType::UiDetails => &[("ui_details_bind", "ui_details_bind_value")],
        BlockType::Location | BlockType::Image | BlockType::Filesystem | BlockType::Ftp | BlockType::Video => &[],
    }
}

/// Rewrites known-mistaken field names on `logic` in place to their
/// canonical counterpart, leaving already-canonical fields untouched. A
/// mistaken key is only applied when the canonical key is absent, so an
/// author-supplied canonical value always wins.
pub fn apply_common_mistakes(block_type: BlockType, logic: &mut Value) {
    let Value::Object(map) = logic else { return };
    for (mistaken, canonical) in common_mistakes(block_type) {
        if map.contains_key(*canonical) {
            continue;
        }
        if let Some(value) = map.remove(*mistaken) {
            map.insert((*canonical).to_string(), value);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_mistaken_fetch_timeout_field() {
        let mut logic = json!({"fetch_timeout": 5000, "fetch_url": "https://x"});
        apply_common_mistakes(BlockType::Fetch, &mut logic);
        assert_eq!(logic["fetch_timeout_ms"], 5000);
        assert!(logic.get("fetch_timeout").is_none());
    }

    #[test]
    fn canonical_field_is_never_overwritten() {
        let mut logic = json!({"fetch_timeout": 5000, "fetch_timeout_ms": 9000});
        apply_common_mistakes(BlockType::Fetch, &mut logic);
        assert_eq!(logic["fetch_timeout_ms"], 9000);
    }

    #[test]
    fn unregistered_type_is_a_no_op() {
        let mut logic = json!({"anything": 1});
        apply_common_mistakes(BlockType::Image, &mut logic);
        assert_eq!(logic, json!({"anything": 1}));
    }
}
