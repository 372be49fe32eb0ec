// workflow-handlers/src/platform.rs
// ============================================================================
// Module: Platform-Bound Handlers
// Description: location/image/filesystem/video block handlers.
// Purpose: Implement the subset of platform-bound block types this
//          workspace's dependency set can support without a device runtime.
// Dependencies: tokio, serde_json, workflow-core
// ============================================================================

//! ## Overview
//! Platform-bound types may be legitimately unregistered on a given
//! execution environment; [`crate::registry::build_registry_for_platform`]
//! decides which of these are wired in. `ftp` has no handler here at all —
//! no FTP client crate is part of this workspace's dependency set, so the
//! type is always unregistered and dispatch fails closed with
//! `HANDLER_UNSUPPORTED` rather than a half-working implementation.
//!
//! `image` and `video` only manipulate already-produced [`Artifact`]
//! metadata and overlays; no decode/encode happens here; true pixel-level
//! processing belongs to the device-side agent that owns the camera/encoder.

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
use workflow_core::model::Artifact;
use workflow_core::model::Block;
use workflow_core::model::BlockType;
use workflow_core::model::Overlay;
use workflow_core::model::OverlayKind;

use crate::bind::bind_completion;
use crate::bind::optional_str;
use crate::bind::required_str;

fn vld(message: impl Into<String>) -> HandlerError {
    HandlerError::new("VALIDATION_ERROR", message)
}

/// Handles `location` blocks: reads a device-reported position out of the
/// trigger event payload.
pub struct LocationHandler;

#[async_trait]
impl BlockHandler for LocationHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Location
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let source = optional_str(&block.logic, "location_source").unwrap_or("device");
        let position = if source == "device" {
            ctx.event.get("location").cloned().unwrap_or(Value::Null)
        } else {
            block.logic.get("location_fallback").cloned().unwrap_or(Value::Null)
        };
        if position.is_null() {
            return Err(HandlerError::new("NOT_FOUND", "no location available for this run"));
        }
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "location_bind_value"), position)))
    }
}

/// Handles `image` blocks: metadata and overlay annotation only, operating
/// against an artifact already present in `ctx.artifacts`.
pub struct ImageHandler;

#[async_trait]
impl BlockHandler for ImageHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Image
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let operation = required_str(&block.logic, "image_operation")?;
        let artifact_id = required_str(&block.logic, "image_artifact_id")?;
        let artifact = ctx
            .artifacts
            .iter()
            .find(|a| a.id.as_str() == artifact_id)
            .ok_or_else(|| HandlerError::new("NOT_FOUND", format!("artifact not found: {artifact_id}")))?;
        let result = match operation {
            "read_metadata" => json!({
                "width": artifact.width,
                "height": artifact.height,
                "mimeType": artifact.mime_type,
                "fileSize": artifact.file_size,
            }),
            "add_overlay" => {
                let overlay = parse_overlay(&block.logic)?;
                json!({"overlayKind": overlay.kind, "pointCount": overlay.points.len()})
            }
            other => return Err(vld(format!("unsupported image_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "image_bind_value"), result)))
    }
}

fn parse_overlay(logic: &Value) -> Result<Overlay, HandlerError> {
    let kind = match required_str(logic, "image_overlay_kind")? {
        "barcode" => OverlayKind::Barcode,
        "text" => OverlayKind::Text,
        "ui_marker" => OverlayKind::UiMarker,
        other => return Err(vld(format!("unsupported image_overlay_kind: {other}"))),
    };
    let points = logic
        .get("image_overlay_points")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|p| {
                    let pair = p.as_array()?;
                    Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
                })
                .collect()
        })
        .unwrap_or_default();
    let label = optional_str(logic, "image_overlay_label").map(str::to_string);
    Ok(Overlay { kind, points, label })
}

/// Handles `video` blocks: metadata passthrough, same posture as [`ImageHandler`].
pub struct VideoHandler;

#[async_trait]
impl BlockHandler for VideoHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Video
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let artifact_id = required_str(&block.logic, "video_artifact_id")?;
        let artifact: &Artifact = ctx
            .artifacts
            .iter()
            .find(|a| a.id.as_str() == artifact_id)
            .ok_or_else(|| HandlerError::new("NOT_FOUND", format!("artifact not found: {artifact_id}")))?;
        let result = json!({
            "mimeType": artifact.mime_type,
            "fileSize": artifact.file_size,
            "fileUrl": artifact.file_url,
        });
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "video_bind_value"), result)))
    }
}

/// Handles `filesystem` blocks: `read | write | exists | delete`, confined
/// to directories published in `ctx.paths`.
pub struct FilesystemHandler;

#[async_trait]
impl BlockHandler for FilesystemHandler {
    fn block_type(&self) -> BlockType {
        BlockType::Filesystem
    }

    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        _locals: &ResolverLocals,
        _cancel: &CancellationToken,
    ) -> HandlerResult {
        let operation = required_str(&block.logic, "filesystem_operation")?;
        let path = resolve_scoped_path(&block.logic, ctx)?;
        let result = match operation {
            "read" => {
                let contents = tokio::fs::read_to_string(&path).await.map_err(|e| HandlerError::new("NOT_FOUND", format!("read failed: {e}")))?;
                Value::String(contents)
            }
            "write" => {
                let contents = required_str(&block.logic, "filesystem_contents")?;
                tokio::fs::write(&path, contents).await.map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("write failed: {e}")))?;
                Value::Bool(true)
            }
            "exists" => Value::Bool(tokio::fs::try_exists(&path).await.unwrap_or(false)),
            "delete" => {
                tokio::fs::remove_file(&path).await.map_err(|e| HandlerError::new("INTERNAL_ERROR", format!("delete failed: {e}")))?;
                Value::Bool(true)
            }
            other => return Err(vld(format!("unsupported filesystem_operation: {other}"))),
        };
        Ok(BlockResult::Completed(bind_completion(optional_str(&block.logic, "filesystem_bind_value"), result)))
    }
}

/// Resolves `filesystem_scope`/`filesystem_path` against `ctx.paths`,
/// rejecting any path that escapes the named scope directory.
fn resolve_scoped_path(logic: &Value, ctx: &WorkflowContext) -> Result<std::path::PathBuf, HandlerError> {
    let scope = optional_str(logic, "filesystem_scope").unwrap_or("workspace");
    let base = ctx.paths.get(scope).ok_or_else(|| vld(format!("unknown filesystem_scope: {scope}")))?;
    let relative = required_str(logic, "filesystem_path")?;
    if relative.contains("..") {
        return Err(vld("filesystem_path must not contain '..'"));
    }
    Ok(std::path::Path::new(base).join(relative))
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

    fn ctx_with(event: Value, paths: BTreeMap<String, String>) -> WorkflowContext {
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
        WorkflowContext::new(run, event, BTreeMap::new(), paths)
    }

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

    #[tokio::test]
    async fn location_reads_device_payload() {
        let ctx = ctx_with(json!({"location": {"lat": 1.0, "lng": 2.0}}), BTreeMap::new());
        let b = block(BlockType::Location, json!({"location_bind_value": "pos"}));
        let result = LocationHandler.handle(&b, &ctx, &ResolverLocals::default(), &CancellationToken::new()).await.unwrap();
        let BlockResult::Completed(completion) = result else { panic!("expected completion") };
        assert_eq!(completion.state_delta["pos"]["lat"], json!(1.0));
    }

    #[tokio::test]
    async fn location_missing_is_not_found() {
        let ctx = ctx_with(json!({}), BTreeMap::new());
        let b = block(BlockType::Location, json!({}));
        let err = LocationHandler.handle(&b, &ctx, &ResolverLocals::default(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, "NOT_FOUND");
    }

    #[tokio::test]
    async fn filesystem_path_traversal_is_rejected() {
        let mut paths = BTreeMap::new();
        paths.insert("workspace".to_string(), "/tmp/ws".to_string());
        let ctx = ctx_with(json!({}), paths);
        let b = block(BlockType::Filesystem, json!({"filesystem_operation": "read", "filesystem_path": "../secret"}));
        let err = FilesystemHandler.handle(&b, &ctx, &ResolverLocals::default(), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, "VALIDATION_ERROR");
    }
}
