// workflow-credentials/src/memory.rs
// ============================================================================
// Module: In-Memory Key Repository
// Description: A non-durable KeyRepository for tests and local development.
// Purpose: Give the credential store's persistence seam a dependency-free
//          backend for tests and local development.
// Dependencies: async-trait, tokio::sync::Mutex, workflow-core::ids
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;

use crate::error::CredentialError;
use crate::model::Key;
use crate::model::KeyAuditEntry;
use crate::repository::KeyRepository;

/// In-memory [`KeyRepository`], keyed by key id with a secondary scoped
/// lookup index.
pub struct InMemoryKeyStore {
    /// Keys by id.
    keys: Arc<Mutex<BTreeMap<String, Key>>>,
    /// Audit entries, append-only, oldest first.
    audit: Arc<Mutex<Vec<KeyAuditEntry>>>,
}

impl InMemoryKeyStore {
    /// Creates an empty in-memory key store.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Arc::new(Mutex::new(BTreeMap::new())), audit: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Returns true if `(org_id, workflow_id, name)` is already taken by a
    /// non-revoked key.
    fn scope_taken(keys: &BTreeMap<String, Key>, org_id: &OrgId, workflow_id: Option<&WorkflowId>, name: &str) -> bool {
        keys.values().any(|key| {
            !key.is_revoked
                && &key.org_id == org_id
                && key.workflow_id.as_ref() == workflow_id
                && key.name == name
        })
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyStore {
    async fn create_key(&self, key: Key) -> Result<(), CredentialError> {
        let mut keys = self.keys.lock().await;
        if Self::scope_taken(&keys, &key.org_id, key.workflow_id.as_ref(), &key.name) {
            return Err(CredentialError::AlreadyExists {
                org_id: key.org_id.as_str().to_string(),
                workflow_id: key.workflow_id.as_ref().map(|id| id.as_str().to_string()),
                name: key.name.clone(),
            });
        }
        keys.insert(key.id.as_str().to_string(), key);
        Ok(())
    }

    async fn find_key(
        &self,
        org_id: &OrgId,
        workflow_id: Option<&WorkflowId>,
        name: &str,
    ) -> Result<Option<Key>, CredentialError> {
        let keys = self.keys.lock().await;
        Ok(keys
            .values()
            .find(|key| {
                !key.is_revoked
                    && &key.org_id == org_id
                    && key.workflow_id.as_ref() == workflow_id
                    && key.name == name
            })
            .cloned())
    }

    async fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>, CredentialError> {
        let keys = self.keys.lock().await;
        Ok(keys.get(key_id.as_str()).cloned())
    }

    async fn list_visible_keys(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<Key>, CredentialError> {
        let keys = self.keys.lock().await;
        let mut visible: Vec<Key> = keys
            .values()
            .filter(|key| {
                &key.org_id == org_id
                    && (key.workflow_id.as_ref() == Some(workflow_id) || key.workflow_id.is_none())
            })
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(visible)
    }

    async fn rotate_key(
        &self,
        key_id: &KeyId,
        encrypted_value: String,
        iv: String,
        rotated_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError> {
        let mut keys = self.keys.lock().await;
        let key = keys
            .get_mut(key_id.as_str())
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.encrypted_value = encrypted_value;
        key.iv = iv;
        key.last_rotated_at = Some(rotated_at);
        Ok(())
    }

    async fn revoke_key(&self, key_id: &KeyId) -> Result<(), CredentialError> {
        let mut keys = self.keys.lock().await;
        let key = keys
            .get_mut(key_id.as_str())
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.is_revoked = true;
        Ok(())
    }

    async fn touch_last_used(
        &self,
        key_id: &KeyId,
        used_at: workflow_core::time::Timestamp,
    ) -> Result<(), CredentialError> {
        let mut keys = self.keys.lock().await;
        let key = keys
            .get_mut(key_id.as_str())
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.last_used_at = Some(used_at);
        Ok(())
    }

    async fn append_audit_entry(&self, entry: KeyAuditEntry) -> Result<(), CredentialError> {
        self.audit.lock().await.push(entry);
        Ok(())
    }

    async fn list_audit_entries(&self, key_id: &KeyId) -> Result<Vec<KeyAuditEntry>, CredentialError> {
        let audit = self.audit.lock().await;
        Ok(audit.iter().filter(|entry| &entry.key_id == key_id).cloned().collect())
    }
}
