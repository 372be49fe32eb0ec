// workflow-credentials/src/model.rs
// ============================================================================
// Module: Credential Data Model
// Description: The Key and KeyAuditEntry rows the credential store manages.
// Purpose: Give the store a stable, serializable shape independent of its
// backing repository.
// Dependencies: serde, workflow-core::{ids, time}
// ============================================================================

//! ## Overview
//! Mirrors the `Key` and `KeyAuditEntry` records. `Key.workflow_id = None`
//! means an org-wide key, as named by the data model's `workflowId?` field.

use serde::Deserialize;
use serde::Serialize;
use workflow_core::ids::AuditEntryId;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;
use workflow_core::time::Timestamp;

/// Where a key's plaintext value is expected to live when decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Value is used by cloud-hosted handlers (e.g. `fetch`, `agent`).
    Cloud,
    /// Value is used only by local/on-device handlers.
    Local,
}

/// A single encrypted credential.
///
/// # Invariants
/// - `(org_id, workflow_id, name)` is unique; `(org_id, name)` with
/// `workflow_id = None` is also unique (enforced by the repository).
/// - `algorithm` is always [`crate::crypto::ALGORITHM_LABEL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Key identifier.
    pub id: KeyId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Scoping workflow; `None` means org-wide.
    pub workflow_id: Option<WorkflowId>,
    /// Author-facing name, e.g. `"openai_api_key"`.
    pub name: String,
    /// Free-text provider label, e.g. `"openai"`, `"aws"`.
    pub provider: String,
    /// Free-text key type, e.g. `"api_key"`, `"oauth_token"`.
    pub key_type: String,
    /// Base64-encoded AES-256-GCM ciphertext.
    pub encrypted_value: String,
    /// Base64-encoded AES-256-GCM nonce.
    pub iv: String,
    /// Fixed encryption algorithm label.
    pub algorithm: String,
    /// Which handlers the decrypted value is expected to reach.
    pub storage_mode: StorageMode,
    /// Optional expiry; an expired key resolves as absent.
    pub expires_at: Option<Timestamp>,
    /// Soft-revocation flag; a revoked key resolves as absent but the row
    /// (and its audit trail) is retained.
    pub is_revoked: bool,
    /// Last time this key was read via [`crate::store::CredentialStore::resolve_all`].
    pub last_used_at: Option<Timestamp>,
    /// Last time this key's ciphertext was rotated.
    pub last_rotated_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Key {
    /// Returns true if this key is eligible for resolution at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        if self.is_revoked {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

/// The closed set of key lifecycle actions that produce an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    /// The key was created.
    Created,
    /// The key's ciphertext was rotated.
    Rotated,
    /// The key was soft-revoked.
    Revoked,
    /// The key's plaintext was read (e.g. resolved into a run's `secrets`).
    Accessed,
}

/// An append-only audit record for one [`Key`] lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAuditEntry {
    /// Audit entry identifier.
    pub id: AuditEntryId,
    /// The key this entry describes.
    pub key_id: KeyId,
    /// What happened.
    pub action: KeyAction,
    /// Who (or what automation) performed it, when known.
    pub performed_by: Option<String>,
    /// Caller IP, when known.
    pub ip_address: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
    /// Free-form structured detail (e.g. which run accessed the key).
    pub metadata: Option<serde_json::Value>,
    /// When this entry was recorded.
    pub created_at: Timestamp,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use workflow_core::time::Timestamp;

    fn sample_key(now: Timestamp) -> Key {
        Key {
            id: KeyId::new("key-1"),
            org_id: OrgId::new("org-1"),
            workflow_id: None,
            name: "openai_api_key".to_string(),
            provider: "openai".to_string(),
            key_type: "api_key".to_string(),
            encrypted_value: "cipher".to_string(),
            iv: "iv".to_string(),
            algorithm: crate::crypto::ALGORITHM_LABEL.to_string(),
            storage_mode: StorageMode::Cloud,
            expires_at: None,
            is_revoked: false,
            last_used_at: None,
            last_rotated_at: None,
            created_at: now,
        }
    }

    #[test]
    fn revoked_key_is_unusable() {
        let now = Timestamp::now();
        let mut key = sample_key(now);
        key.is_revoked = true;
        assert!(!key.is_usable_at(now));
    }

    #[test]
    fn unexpired_key_is_usable() {
        let now = Timestamp::now();
        let key = sample_key(now);
        assert!(key.is_usable_at(now));
    }
}
