// workflow-handlers/src/ui.rs
// ============================================================================
// Module: Interactive UI Handlers
// Description: ui_camera/ui_form/ui_table/ui_details block handlers.
// Purpose: Turn a block's resolved logic into the pause payload shape a
//          client renders, per the UI pause payload conventions.
// Dependencies: serde_json, workflow-core
// ============================================================================

//! ## Overview
//! Every handler here always returns [`BlockResult::Paused`] — these are
//! the four `BlockType::is_interactive` types, and the interpreter asserts
//! that invariant rather than each handler re-checking it.

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use workflow_core::BlockHandler;
use workflow_core::BlockResult;
use workflow_core::CancellationToken;
use workflow_core::HandlerResult;
use workflow_core::PauseDirective;
use workflow_core::PauseKind;
use workflow_core::ResolverLocals;
use workflow_core::WorkflowContext;
use workflow_core::model::Block;
use workflow_core::model::BlockType;

use crate::bind::optional_str;
use crate::bind::required_str;

/// Handles `ui_camera` blocks.
pub struct UiCameraHandler;

#[async_trait]
impl BlockHandler for UiCameraHandler {
    fn block_type(&self) -> BlockType {
        BlockType::UiCamera
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let payload = json!({
            "title": required_str(&block.logic, "ui_title")?,
            "instructions": optional_str(&block.logic, "ui_instructions").unwrap_or(""),
            "mode": optional_str(&block.logic, "ui_camera_mode").unwrap_or("photo"),
            "flash": optional_str(&block.logic, "ui_camera_flash").unwrap_or("auto"),
        });
        Ok(BlockResult::Paused(PauseDirective {
            kind: PauseKind::UiCamera,
            payload,
            bind_value: optional_str(&block.logic, "ui_bind_value").map(str::to_string),
        }))
    }
}

/// Handles `ui_form` blocks.
pub struct UiFormHandler;

#[async_trait]
impl BlockHandler for UiFormHandler {
    fn block_type(&self) -> BlockType {
        BlockType::UiForm
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let fields = block.logic.get("ui_form_fields").and_then(Value::as_array).cloned().unwrap_or_default();
        let payload = json!({
            "title": required_str(&block.logic, "ui_title")?,
            "fields": fields,
        });
        Ok(BlockResult::Paused(PauseDirective {
            kind: PauseKind::UiForm,
            payload,
            bind_value: optional_str(&block.logic, "ui_bind_value").map(str::to_string),
        }))
    }
}

/// Handles `ui_table` blocks.
pub struct UiTableHandler;

#[async_trait]
impl BlockHandler for UiTableHandler {
    fn block_type(&self) -> BlockType {
        BlockType::UiTable
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let data = block.logic.get("ui_table_data").cloned().unwrap_or(Value::Array(vec![]));
        let columns = block.logic.get("ui_table_columns").and_then(Value::as_array).cloned().unwrap_or_default();
        let searchable = block.logic.get("ui_table_searchable").and_then(Value::as_bool).unwrap_or(false);
        let payload = json!({
            "title": required_str(&block.logic, "ui_title")?,
            "data": data,
            "columns": columns,
            "searchable": searchable,
        });
        Ok(BlockResult::Paused(PauseDirective {
            kind: PauseKind::UiTable,
            payload,
            bind_value: optional_str(&block.logic, "ui_bind_value").map(str::to_string),
        }))
    }
}

/// Handles `ui_details` blocks.
pub struct UiDetailsHandler;

#[async_trait]
impl BlockHandler for UiDetailsHandler {
    fn block_type(&self) -> BlockType {
        BlockType::UiDetails
    }

    async fn handle(
        &self,
        block: &Block,
        _ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let data = block.logic.get("ui_details_data").cloned().unwrap_or(Value::Null);
        let fields = block.logic.get("ui_details_fields").and_then(Value::as_array).cloned().unwrap_or_default();
        let layout = optional_str(&block.logic, "ui_details_layout").unwrap_or("list");
        let payload = json!({
            "title": required_str(&block.logic, "ui_title")?,
            "data": data,
            "layout": layout,
            "fields": fields,
        });
        Ok(BlockResult::Paused(PauseDirective {
            kind: PauseKind::UiDetails,
            payload,
            bind_value: optional_str(&block.logic, "ui_bind_value").map(str::to_string),
        }))
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
        WorkflowContext::new(run, json!({}), BTreeMap::new(), BTreeMap::new())
    }

    #[tokio::test]
    async fn ui_form_pauses_with_field_payload() {
        let b = block(BlockType::UiForm, json!({"ui_title": "Confirm", "ui_form_fields": [{"name": "ok", "type": "boolean", "label": "OK?"}]}));
        let result = UiFormHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Paused(pause) = result else { panic!("expected pause") };
        assert_eq!(pause.kind, PauseKind::UiForm);
        assert_eq!(pause.payload["title"], "Confirm");
    }

    #[tokio::test]
    async fn ui_camera_defaults_mode_and_flash() {
        let b = block(BlockType::UiCamera, json!({"ui_title": "Scan"}));
        let result = UiCameraHandler.handle(&b, &ctx(), &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Paused(pause) = result else { panic!("expected pause") };
        assert_eq!(pause.payload["mode"], "photo");
        assert_eq!(pause.payload["flash"], "auto");
    }
}
