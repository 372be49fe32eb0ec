// workflow-handlers/src/registry.rs
// ============================================================================
// Module: Handler Registry Assembly
// Description: Wires every concrete handler into a `HandlerRegistry`.
// Purpose: Give the server and CLI one call to build a fully-populated
//          registry, and a second for a platform with a reduced handler set.
// Dependencies: workflow-core, crate::*
// ============================================================================

//! ## Overview
//! [`build_default_registry`] registers every handler except `ftp`, which
//! has none (see [`crate::platform`]). [`build_registry_for_platform`]
//! additionally drops the platform-bound handlers a named execution
//! environment does not support, so the interpreter's `HANDLER_UNSUPPORTED`
//! path is reachable in tests without constructing a bespoke registry.

use std::sync::Arc;

use workflow_core::HandlerRegistry;
use workflow_core::model::BlockType;

use crate::agent::AgentHandler;
use crate::code::CodeHandler;
use crate::fetch::FetchHandler;
use crate::goto::GotoHandler;
use crate::platform::FilesystemHandler;
use crate::platform::ImageHandler;
use crate::platform::LocationHandler;
use crate::platform::VideoHandler;
use crate::sleep::SleepHandler;
use crate::transform::ArrayHandler;
use crate::transform::DateHandler;
use crate::transform::MathHandler;
use crate::transform::NormalizeHandler;
use crate::transform::ObjectHandler;
use crate::transform::StringHandler;
use crate::ui::UiCameraHandler;
use crate::ui::UiDetailsHandler;
use crate::ui::UiFormHandler;
use crate::ui::UiTableHandler;
use crate::validation::ValidationHandler;

/// Builds a registry with every handler this crate implements registered.
/// There is no `ftp` entry; see [`crate::platform`].
#[must_use]
pub fn build_default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(ObjectHandler));
    registry.register(Arc::new(StringHandler));
    registry.register(Arc::new(ArrayHandler));
    registry.register(Arc::new(MathHandler));
    registry.register(Arc::new(DateHandler));
    registry.register(Arc::new(NormalizeHandler));
    registry.register(Arc::new(LocationHandler));
    registry.register(Arc::new(FetchHandler));
    registry.register(Arc::new(AgentHandler));
    registry.register(Arc::new(GotoHandler));
    registry.register(Arc::new(SleepHandler));
    registry.register(Arc::new(UiCameraHandler));
    registry.register(Arc::new(UiFormHandler));
    registry.register(Arc::new(UiTableHandler));
    registry.register(Arc::new(UiDetailsHandler));
    registry.register(Arc::new(ImageHandler));
    registry.register(Arc::new(FilesystemHandler));
    registry.register(Arc::new(CodeHandler));
    registry.register(Arc::new(VideoHandler));
    registry.register(Arc::new(ValidationHandler));
    registry
}

/// Builds a registry scoped to a named execution environment, dropping the
/// platform-bound handlers that environment does not support.
///
/// Known platforms: `"server"` (no camera/filesystem/image/video — those are
/// device-local concerns) and `"device"` (the full set, matching
/// [`build_default_registry`]). Any other platform name falls back to the
/// full set.
#[must_use]
pub fn build_registry_for_platform(platform: &str) -> HandlerRegistry {
    let mut registry = build_default_registry();
    if platform == "server" {
        for unsupported in [BlockType::Location, BlockType::Image, BlockType::Filesystem, BlockType::Video] {
            registry = remove(registry, unsupported);
        }
    }
    registry
}

/// Rebuilds `registry` without `block_type`. `HandlerRegistry` has no
/// removal API by design (it only grows during startup); a platform-scoped
/// registry is instead built by selective (re)registration.
fn remove(mut registry: HandlerRegistry, excluded: BlockType) -> HandlerRegistry {
    let mut reduced = HandlerRegistry::new();
    for block_type in all_block_types() {
        if block_type == excluded {
            continue;
        }
        if let Some(handler) = registry.get(block_type) {
            reduced.register(handler);
        }
    }
    registry = reduced;
    registry
}

fn all_block_types() -> [BlockType; 20] {
    [
        BlockType::Object,
        BlockType::String,
        BlockType::Array,
        BlockType::Math,
        BlockType::Date,
        BlockType::Normalize,
        BlockType::Location,
        BlockType::Fetch,
        BlockType::Agent,
        BlockType::Goto,
        BlockType::Sleep,
        BlockType::UiCamera,
        BlockType::UiForm,
        BlockType::UiTable,
        BlockType::UiDetails,
        BlockType::Image,
        BlockType::Filesystem,
        BlockType::Code,
        BlockType::Video,
        BlockType::Validation,
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_no_ftp_handler() {
        let registry = build_default_registry();
        assert!(registry.get(BlockType::Ftp).is_none());
    }

    #[test]
    fn default_registry_supports_every_non_ftp_type() {
        let registry = build_default_registry();
        assert!(registry.supports_all(all_block_types().iter()));
    }

    #[test]
    fn server_platform_drops_device_local_handlers() {
        let registry = build_registry_for_platform("server");
        assert!(registry.get(BlockType::Image).is_none());
        assert!(registry.get(BlockType::Filesystem).is_none());
        assert!(registry.get(BlockType::Fetch).is_some());
    }

    #[test]
    fn device_platform_keeps_full_set() {
        let registry = build_registry_for_platform("device");
        assert!(registry.supports_all(all_block_types().iter()));
    }
}
