// workflow-credentials/src/repository.rs
// ============================================================================
// Module: Key Repository Contract
// Description: The persistence seam the credential store calls into.
// Purpose: Keep key storage pluggable, mirroring workflow-core's
//          RunRepository/SecretResolver/EventPublisher seam.
// Dependencies: async-trait, workflow-core::ids
// ============================================================================

use async_trait::async_trait;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;

use crate::error::CredentialError;
use crate::model::Key;
use crate::model::KeyAuditEntry;

/// Persists [`Key`] rows and their [`KeyAuditEntry`] trail.
///
/// # Errors
/// Every method returns [`CredentialError`] on I/O failure; "not found" is
/// `Ok(None)` for lookups and [`CredentialError::NotFound`] for mutations
/// that require the row to exist.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Inserts a new key row.
    ///
    /// Returns [`CredentialError::AlreadyExists`] if `(org_id, workflow_id,
    /// name)` (or the org-wide `(org_id, name)` slot) is already taken.
    async fn create_key(&self, key: Key) -> Result<(), CredentialError>;

    /// Loads a key by its scoped lookup triple, preferring the
    /// workflow-scoped row over the org-wide row when both exist.
    async fn find_key(
        &self,
        org_id: &OrgId,
        workflow_id: Option<&WorkflowId>,
        name: &str,
    ) -> Result<Option<Key>, CredentialError>;

    /// Loads a key by id.
    async fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>, CredentialError>;

    /// Lists every key visible to `(org_id, workflow_id)`: the workflow-scoped
    /// set plus the org-wide set.
    async fn list_visible_keys(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<Key>, CredentialError>;

    /// Atomically replaces a key's ciphertext, iv, and `last_rotated_at`.
    async fn rotate_key(
        &self,
        key_id: &KeyId,
        encrypted_value: String,
        iv: String,
        rotated_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError>;

    /// Soft-revokes a key (row and audit trail retained).
    async fn revoke_key(&self, key_id: &KeyId) -> Result<(), CredentialError>;

    /// Stamps `last_used_at` on a key without altering any other field.
    async fn touch_last_used(
        &self,
        key_id: &KeyId,
        used_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError>;

    /// Appends an audit entry. Append-only: entries are never updated or
    /// deleted by this trait.
    async fn append_audit_entry(&self, entry: KeyAuditEntry) -> Result<(), CredentialError>;

    /// Lists audit entries for a key, oldest first.
    async fn list_audit_entries(&self, key_id: &KeyId) -> Result<Vec<KeyAuditEntry>, CredentialError>;
}

// A host process picks its backend (in-memory vs. SQLite) from configuration
// at startup, after `CredentialStore<R>`'s type parameter is already fixed by
// the surrounding `Interpreter` monomorphization. This forwarding impl lets
// `R = Box<dyn KeyRepository>` stand in for either concrete backend.
#[async_trait]
impl KeyRepository for Box<dyn KeyRepository> {
    async fn create_key(&self, key: Key) -> Result<(), CredentialError> {
        (**self).create_key(key).await
    }

    async fn find_key(
        &self,
        org_id: &OrgId,
        workflow_id: Option<&WorkflowId>,
        name: &str,
    ) -> Result<Option<Key>, CredentialError> {
        (**self).find_key(org_id, workflow_id, name).await
    }

    async fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>, CredentialError> {
        (**self).get_key(key_id).await
    }

    async fn list_visible_keys(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<Key>, CredentialError> {
        (**self).list_visible_keys(org_id, workflow_id).await
    }

    async fn rotate_key(
        &self,
        key_id: &KeyId,
        encrypted_value: String,
        iv: String,
        rotated_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError> {
        (**self).rotate_key(key_id, encrypted_value, iv, rotated_at).await
    }

    async fn revoke_key(&self, key_id: &KeyId) -> Result<(), CredentialError> {
        (**self).revoke_key(key_id).await
    }

    async fn touch_last_used(
        &self,
        key_id: &KeyId,
        used_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError> {
        (**self).touch_last_used(key_id, used_at).await
    }

    async fn append_audit_entry(&self, entry: KeyAuditEntry) -> Result<(), CredentialError> {
        (**self).append_audit_entry(entry).await
    }

    async fn list_audit_entries(&self, key_id: &KeyId) -> Result<Vec<KeyAuditEntry>, CredentialError> {
        (**self).list_audit_entries(key_id).await
    }
}
