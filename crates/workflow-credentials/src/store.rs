// workflow-credentials/src/store.rs
// ============================================================================
// Module: Credential Store
// Description: Scoped key resolution, lifecycle operations, and audit
// logging over a KeyRepository.
// Purpose: Implement workflow-core::SecretResolver and the credential
// create/rotate/revoke lifecycle.
// Dependencies: async-trait, nanoid, workflow-core
// ============================================================================

//! ## Overview
//! [`CredentialStore`] is the concrete collaborator `workflow-core`'s
//! [`workflow_core::SecretResolver`] trait is written against. It owns the
//! process-held [`MasterKey`] and never exposes it; every call here accepts
//! or returns plaintext strings, not key bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use workflow_core::SecretError;
use workflow_core::SecretResolver;
use workflow_core::audit::AuditEvent;
use workflow_core::audit::AuditSink;
use workflow_core::audit::NoopAuditSink;
use workflow_core::ids::AuditEntryId;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;
use workflow_core::time::Timestamp;

use crate::crypto::ALGORITHM_LABEL;
use crate::crypto::MasterKey;
use crate::crypto::decrypt_value;
use crate::crypto::encrypt_value;
use crate::error::CredentialError;
use crate::model::Key;
use crate::model::KeyAction;
use crate::model::KeyAuditEntry;
use crate::model::StorageMode;
use crate::repository::KeyRepository;

/// The length of generated [`workflow_core::ids::KeyId`] and
/// [`workflow_core::ids::AuditEntryId`] values.
const ID_LENGTH: usize = 21;

/// Caller context recorded alongside an audit entry.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    /// Who performed the action, when known (user id, automation name).
    pub performed_by: Option<String>,
    /// Caller IP, when known.
    pub ip_address: Option<String>,
    /// Caller user agent, when known.
    pub user_agent: Option<String>,
}

/// The encrypted, audited credential store backing workflow-core's secret
/// resolution and the `keys` administration surface.
pub struct CredentialStore<R: KeyRepository> {
    repository: R,
    master_key: MasterKey,
    audit_sink: Arc<dyn AuditSink>,
}

impl<R: KeyRepository> CredentialStore<R> {
    /// Builds a credential store over `repository`, logging structured audit
    /// events to stderr/file/noop per `audit_sink`.
    pub fn new(repository: R, master_key: MasterKey, audit_sink: Arc<dyn AuditSink>) -> Self {
        Self { repository, master_key, audit_sink }
    }

    /// Builds a credential store with a no-op audit sink, for tests and
    /// local development.
    pub fn with_noop_audit(repository: R, master_key: MasterKey) -> Self {
        Self::new(repository, master_key, Arc::new(NoopAuditSink))
    }

    fn emit(&self, action: KeyAction, key: &Key) {
        let event = AuditEvent::now(action_label(action))
            .with_org(key.org_id.as_str())
            .with_detail(format!("key={} name={}", key.id.as_str(), key.name));
        self.audit_sink.record(&event);
    }

    async fn record_audit_row(
        &self,
        key_id: &KeyId,
        action: KeyAction,
        context: &AuditContext,
    ) -> Result<(), CredentialError> {
        self.repository
            .append_audit_entry(KeyAuditEntry {
                id: AuditEntryId::new(nanoid::nanoid!(ID_LENGTH)),
                key_id: key_id.clone(),
                action,
                performed_by: context.performed_by.clone(),
                ip_address: context.ip_address.clone(),
                user_agent: context.user_agent.clone(),
                metadata: None,
                created_at: Timestamp::now(),
            })
            .await
    }

    /// Creates a new key, encrypting `plaintext_value` under the process
    /// master key.
    ///
    /// # Errors
    /// Returns [`CredentialError::AlreadyExists`] if `(org_id, workflow_id,
    /// name)` (or the org-wide slot) is already taken, or a crypto error if
    /// encryption fails.
    #[allow(clippy::too_many_arguments, reason = "mirrors the Key record's own field count")]
    pub async fn create_key(
        &self,
        org_id: OrgId,
        workflow_id: Option<WorkflowId>,
        name: String,
        provider: String,
        key_type: String,
        plaintext_value: &str,
        storage_mode: StorageMode,
        expires_at: Option<Timestamp>,
        context: &AuditContext,
    ) -> Result<Key, CredentialError> {
        let (encrypted_value, iv) = encrypt_value(plaintext_value, &self.master_key)?;
        let now = Timestamp::now();
        let key = Key {
            id: KeyId::new(nanoid::nanoid!(ID_LENGTH)),
            org_id,
            workflow_id,
            name,
            provider,
            key_type,
            encrypted_value,
            iv,
            algorithm: ALGORITHM_LABEL.to_string(),
            storage_mode,
            expires_at,
            is_revoked: false,
            last_used_at: None,
            last_rotated_at: None,
            created_at: now,
        };
        self.repository.create_key(key.clone()).await?;
        self.record_audit_row(&key.id, KeyAction::Created, context).await?;
        self.emit(KeyAction::Created, &key);
        Ok(key)
    }

    /// Resolves `(org_id, name)` through the scoped lookup order:
    /// workflow-scoped first, then org-wide, else `None`. A
    /// revoked or expired key resolves as absent, not an error.
    ///
    /// # Errors
    /// Returns [`CredentialError`] only on repository I/O failure.
    pub async fn get_key(
        &self,
        org_id: &OrgId,
        name: &str,
        workflow_id: Option<&WorkflowId>,
        context: &AuditContext,
    ) -> Result<Option<String>, CredentialError> {
        let candidate = if let Some(workflow_id) = workflow_id {
            match self.repository.find_key(org_id, Some(workflow_id), name).await? {
                Some(key) => Some(key),
                None => self.repository.find_key(org_id, None, name).await?,
            }
        } else {
            self.repository.find_key(org_id, None, name).await?
        };
        let Some(key) = candidate else {
            return Ok(None);
        };
        let now = Timestamp::now();
        if !key.is_usable_at(now) {
            return Ok(None);
        }
        let plaintext = decrypt_value(&key.encrypted_value, &key.iv, &self.master_key)?;
        self.repository.touch_last_used(&key.id, now).await?;
        self.record_audit_row(&key.id, KeyAction::Accessed, context).await?;
        self.emit(KeyAction::Accessed, &key);
        Ok(Some(plaintext))
    }

    /// Replaces a key's ciphertext with a freshly encrypted value, atomically
    /// updating `last_rotated_at`.
    ///
    /// # Errors
    /// Returns [`CredentialError::NotFound`] if the key does not exist.
    pub async fn rotate_key(
        &self,
        key_id: &KeyId,
        new_plaintext_value: &str,
        context: &AuditContext,
    ) -> Result<(), CredentialError> {
        let key = self
            .repository
            .get_key(key_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        let (encrypted_value, iv) = encrypt_value(new_plaintext_value, &self.master_key)?;
        let now = Timestamp::now();
        self.repository.rotate_key(key_id, encrypted_value, iv, now).await?;
        self.record_audit_row(key_id, KeyAction::Rotated, context).await?;
        self.emit(KeyAction::Rotated, &key);
        Ok(())
    }

    /// Soft-revokes a key: the row and its audit trail are retained, but it
    /// no longer resolves.
    ///
    /// # Errors
    /// Returns [`CredentialError::NotFound`] if the key does not exist.
    pub async fn revoke_key(&self, key_id: &KeyId, context: &AuditContext) -> Result<(), CredentialError> {
        let key = self
            .repository
            .get_key(key_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        self.repository.revoke_key(key_id).await?;
        self.record_audit_row(key_id, KeyAction::Revoked, context).await?;
        self.emit(KeyAction::Revoked, &key);
        Ok(())
    }

    /// Lists every key visible to `(org_id, workflow_id)` (ciphertext never
    /// included; callers needing plaintext must call [`Self::get_key`]).
    ///
    /// # Errors
    /// Returns [`CredentialError`] on repository I/O failure.
    pub async fn list_visible_keys(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<Key>, CredentialError> {
        self.repository.list_visible_keys(org_id, workflow_id).await
    }

    /// Lists the audit trail for one key, oldest first.
    ///
    /// # Errors
    /// Returns [`CredentialError`] on repository I/O failure.
    pub async fn list_audit_entries(&self, key_id: &KeyId) -> Result<Vec<KeyAuditEntry>, CredentialError> {
        self.repository.list_audit_entries(key_id).await
    }
}

#[async_trait]
impl<R: KeyRepository> SecretResolver for CredentialStore<R> {
    async fn resolve_all(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<BTreeMap<String, String>, SecretError> {
        let visible = self
            .repository
            .list_visible_keys(org_id, workflow_id)
            .await
            .map_err(|err| SecretError::Store(err.to_string()))?;
        let now = Timestamp::now();

        // Org-wide keys populate the map first so a workflow-scoped key of
        // the same name overrides it, per the resolution order.
        let mut org_wide = BTreeMap::new();
        let mut scoped = BTreeMap::new();
        for key in &visible {
            if !key.is_usable_at(now) {
                continue;
            }
            let plaintext = decrypt_value(&key.encrypted_value, &key.iv, &self.master_key)
                .map_err(|err| SecretError::Store(err.to_string()))?;
            if key.workflow_id.is_some() {
                scoped.insert(key.name.clone(), (key, plaintext));
            } else {
                org_wide.insert(key.name.clone(), (key, plaintext));
            }
        }
        let mut resolved = BTreeMap::new();
        for (name, (key, plaintext)) in org_wide {
            resolved.insert(name, (key.clone(), plaintext));
        }
        for (name, (key, plaintext)) in scoped {
            resolved.insert(name, (key.clone(), plaintext));
        }

        let mut result = BTreeMap::new();
        for (name, (key, plaintext)) in resolved {
            self.repository.touch_last_used(&key.id, now).await.map_err(|err| SecretError::Store(err.to_string()))?;
            self.record_audit_row(&key.id, KeyAction::Accessed, &AuditContext::default())
                .await
                .map_err(|err| SecretError::Store(err.to_string()))?;
            self.emit(KeyAction::Accessed, &key);
            result.insert(name, plaintext);
        }
        Ok(result)
    }
}

const fn action_label(action: KeyAction) -> &'static str {
    match action {
        KeyAction::Created => "key.created",
        KeyAction::Rotated => "key.rotated",
        KeyAction::Revoked => "key.revoked",
        KeyAction::Accessed => "key.accessed",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::memory::InMemoryKeyStore;

    fn store() -> CredentialStore<InMemoryKeyStore> {
        CredentialStore::with_noop_audit(InMemoryKeyStore::new(), MasterKey::generate())
    }

    #[tokio::test]
    async fn create_then_get_key_round_trips_plaintext() {
        let store = store();
        let org_id = OrgId::new("org-1");
        let key = store
            .create_key(
                org_id.clone(),
                None,
                "openai_api_key".to_string(),
                "openai".to_string(),
                "api_key".to_string(),
                "sk-live-abc",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        let resolved = store.get_key(&org_id, &key.name, None, &AuditContext::default()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("sk-live-abc"));
    }

    #[tokio::test]
    async fn workflow_scoped_key_wins_over_org_wide() {
        let store = store();
        let org_id = OrgId::new("org-1");
        let workflow_id = WorkflowId::new("wf-1");
        store
            .create_key(
                org_id.clone(),
                None,
                "api_key".to_string(),
                "provider".to_string(),
                "api_key".to_string(),
                "org-wide-value",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        store
            .create_key(
                org_id.clone(),
                Some(workflow_id.clone()),
                "api_key".to_string(),
                "provider".to_string(),
                "api_key".to_string(),
                "workflow-scoped-value",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        let resolved =
            store.get_key(&org_id, "api_key", Some(&workflow_id), &AuditContext::default()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("workflow-scoped-value"));

        let resolve_all = store.resolve_all(&org_id, &workflow_id).await.unwrap();
        assert_eq!(resolve_all.get("api_key").map(String::as_str), Some("workflow-scoped-value"));
    }

    #[tokio::test]
    async fn revoked_key_resolves_as_absent() {
        let store = store();
        let org_id = OrgId::new("org-1");
        let key = store
            .create_key(
                org_id.clone(),
                None,
                "k".to_string(),
                "p".to_string(),
                "api_key".to_string(),
                "v",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        store.revoke_key(&key.id, &AuditContext::default()).await.unwrap();
        let resolved = store.get_key(&org_id, "k", None, &AuditContext::default()).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn rotate_key_changes_plaintext_and_records_audit() {
        let store = store();
        let org_id = OrgId::new("org-1");
        let key = store
            .create_key(
                org_id.clone(),
                None,
                "k".to_string(),
                "p".to_string(),
                "api_key".to_string(),
                "old-value",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        store.rotate_key(&key.id, "new-value", &AuditContext::default()).await.unwrap();
        let resolved = store.get_key(&org_id, "k", None, &AuditContext::default()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("new-value"));
        let audit = store.list_audit_entries(&key.id).await.unwrap();
        assert_eq!(audit.len(), 3); // created, rotated, accessed
    }

    #[tokio::test]
    async fn expired_key_resolves_as_absent() {
        let store = store();
        let org_id = OrgId::new("org-1");
        let past = Timestamp::from_offset(time::OffsetDateTime::now_utc() - time::Duration::seconds(60));
        store
            .create_key(
                org_id.clone(),
                None,
                "k".to_string(),
                "p".to_string(),
                "api_key".to_string(),
                "v",
                StorageMode::Cloud,
                Some(past),
                &AuditContext::default(),
            )
            .await
            .unwrap();
        let resolved = store.get_key(&org_id, "k", None, &AuditContext::default()).await.unwrap();
        assert!(resolved.is_none());
    }
}
