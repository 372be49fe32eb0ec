// workflow-credentials/src/lib.rs
// ============================================================================
// Module: Workflow Credentials Library
// Description: Public API surface for the encrypted credential store.
// Purpose: Expose the Key/KeyAuditEntry model, the KeyRepository seam, an
//          in-memory implementation, and the CredentialStore that
//          implements workflow-core's SecretResolver.
// Dependencies: crate::{crypto, error, memory, model, repository, store}
// ============================================================================

//! ## Overview
//! `workflow-credentials` encrypts and stores provider keys, enforces the
//! workflow-scoped-then-org-wide resolution order, and audits every
//! create/rotate/revoke/access. It depends on `workflow-core` only for
//! shared ids, timestamps, and the `SecretResolver` seam it implements —
//! never the reverse.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod crypto;
pub mod error;
pub mod memory;
pub mod model;
pub mod repository;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crypto::ALGORITHM_LABEL;
pub use crypto::CryptoError;
pub use crypto::MasterKey;
pub use error::CredentialError;
pub use memory::InMemoryKeyStore;
pub use model::Key;
pub use model::KeyAction;
pub use model::KeyAuditEntry;
pub use model::StorageMode;
pub use repository::KeyRepository;
pub use store::AuditContext;
pub use store::CredentialStore;
