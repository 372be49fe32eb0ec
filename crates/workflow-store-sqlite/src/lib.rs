// workflow-store-sqlite/src/lib.rs
// ============================================================================
// Module: Workflow Store SQLite Library
// Description: Public API surface for the SQLite-backed RunRepository and
//              KeyRepository implementations.
// Purpose: Expose the concrete collaborators that implement workflow-core's
//          RunRepository seam and workflow-credentials's KeyRepository seam
//          for hosts that need a durable store.
// Dependencies: crate::{error, keys, store}
// ============================================================================

//! ## Overview
//! A single `SQLite` connection per repository, each guarded by a
//! `tokio::sync::Mutex`, storing one JSON snapshot per row. See
//! [`store::SqliteRunRepository`] and [`keys::SqliteKeyRepository`] for the
//! full design rationale.

pub mod error;
pub mod keys;
pub mod store;

pub use error::SqliteStoreError;
pub use keys::SqliteKeyRepository;
pub use store::SqliteRunRepository;
