// workflow-core/src/handler.rs
// ============================================================================
// Module: Block Handler Contract & Registry
// Description: The trait every block-type handler implements, and the
//              version-scoped registry the interpreter dispatches through.
// Purpose: Keep the interpreter dispatch a total match over a registered set
//          without depending on any concrete handler implementation.
// Dependencies: async-trait, crate::{block_result, cancel, context, model, resolver}
// ============================================================================

//! ## Overview
//! Concrete handlers (fetch, agent, goto, sleep, ui_form, ...) live in the
//! `workflow-handlers` crate, which builds a [`HandlerRegistry`] at startup.
//! `workflow-core` only owns the contract: `(Block, Context) -> BlockResult`,
//! fallible, with no access to `ctx.secrets` mutation and no implicit I/O
//! beyond what the handler's own cancellation-aware client does.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::block_result::HandlerResult;
use crate::cancel::CancellationToken;
use crate::context::WorkflowContext;
use crate::model::Block;
use crate::model::BlockType;
use crate::resolver::ResolverLocals;

/// Executable behaviour bound to one [`BlockType`].
///
/// Implementations must not mutate `ctx.secrets`; they read context via the
/// caller-resolved `block` (already typo-rewritten and reference-resolved by
/// the interpreter) and return deltas through [`crate::block_result::BlockResult`].
#[async_trait]
pub trait BlockHandler: Send + Sync {
    /// The block type this handler dispatches for.
    fn block_type(&self) -> BlockType;

    /// Executes `block` against the read-only `ctx` and loop `locals`.
    ///
    /// # Errors
    /// Returns [`crate::error::HandlerError`] to signal block failure; the
    /// interpreter maps this to a failed step, not a panic.
    async fn handle(
        &self,
        block: &Block,
        ctx: &WorkflowContext,
        locals: &ResolverLocals,
        cancel: &CancellationToken,
    ) -> HandlerResult;
}

/// A version-scoped (really, process-scoped) table of one handler per
/// [`BlockType`]. Platform-bound types may be absent; the interpreter maps a
/// missing lookup to `HANDLER_UNSUPPORTED` rather than panicking.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<BlockType, Arc<dyn BlockHandler>>,
}

impl HandlerRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Registers `handler` for its own [`BlockHandler::block_type`],
    /// replacing any prior handler for that type.
    pub fn register(&mut self, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(handler.block_type(), handler);
    }

    /// Looks up the handler for `block_type`, if any is registered on this
    /// platform.
    #[must_use]
    pub fn get(&self, block_type: BlockType) -> Option<Arc<dyn BlockHandler>> {
        self.handlers.get(&block_type).cloned()
    }

    /// Returns true if every block type in `types` has a registered handler.
    #[must_use]
    pub fn supports_all<'a>(&self, types: impl IntoIterator<Item = &'a BlockType>) -> bool {
        types.into_iter().all(|t| self.handlers.contains_key(t))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::block_result::BlockResult;

    struct NoopHandler(BlockType);

    #[async_trait]
    impl BlockHandler for NoopHandler {
        fn block_type(&self) -> BlockType {
            self.0
        }

        async fn handle(
            &self,
            _block: &Block,
            _ctx: &WorkflowContext,
            _locals: &ResolverLocals,
            _cancel: &CancellationToken,
        ) -> HandlerResult {
            Ok(BlockResult::empty_completion())
        }
    }

    #[test]
    fn registry_looks_up_by_block_type() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler(BlockType::Math)));
        assert!(registry.get(BlockType::Math).is_some());
        assert!(registry.get(BlockType::Ftp).is_none());
    }

    #[test]
    fn supports_all_detects_missing_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(NoopHandler(BlockType::Math)));
        assert!(registry.supports_all(&[BlockType::Math]));
        assert!(!registry.supports_all(&[BlockType::Math, BlockType::Ftp]));
    }
}
