// workflow-store-sqlite/src/keys.rs
// ============================================================================
// Module: SQLite Key Repository
// Description: Durable KeyRepository backed by SQLite, for workflow-server
//              deployments configured with `credentials.type = "sqlite"`.
// Purpose: Give the credential store a persistence option that survives
//          process restarts, alongside workflow-credentials's own
//          InMemoryKeyStore.
// Dependencies: rusqlite (bundled), serde_json, tokio::sync::Mutex,
//               workflow-core, workflow-credentials
// ============================================================================

//! ## Overview
//! Same JSON-snapshot-per-row shape as [`crate::store::SqliteRunRepository`],
//! with `org_id`, `workflow_id`, and `name` pulled into indexed columns so
//! the `(org_id, workflow_id, name)` uniqueness invariant can be enforced by
//! a partial unique index rather than a table scan, unlike the in-memory
//! store's linear `scope_taken` check.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tokio::sync::Mutex;
use workflow_credentials::CredentialError;
use workflow_credentials::Key;
use workflow_credentials::KeyAuditEntry;
use workflow_credentials::KeyRepository;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;
use workflow_core::time::Timestamp;

use crate::error::SqliteStoreError;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// A durable [`KeyRepository`] backed by one `SQLite` connection.
pub struct SqliteKeyRepository {
    connection: Mutex<Connection>,
}

impl SqliteKeyRepository {
    /// Opens (creating if absent) a `SQLite` database at `path` and applies
    /// the schema.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError::Db`] if the connection cannot be opened
    /// or the schema cannot be initialized.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(path, flags)?;
        apply_pragmas(&connection)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }

    /// Opens an in-memory database, for tests and local development.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError::Db`] if the connection cannot be opened
    /// or the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()?;
        apply_pragmas(&connection)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }
}

fn apply_pragmas(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    connection.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS keys (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            workflow_id TEXT,
            name TEXT NOT NULL,
            is_revoked INTEGER NOT NULL,
            data_json BLOB NOT NULL
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_keys_scope
            ON keys (org_id, COALESCE(workflow_id, ''), name)
            WHERE is_revoked = 0;
         CREATE TABLE IF NOT EXISTS key_audit_entries (
            id TEXT PRIMARY KEY,
            key_id TEXT NOT NULL,
            data_json BLOB NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_key_audit_key ON key_audit_entries (key_id);",
    )?;
    Ok(())
}

fn to_store_err(err: SqliteStoreError) -> CredentialError {
    CredentialError::Io(err.to_string())
}

#[async_trait]
impl KeyRepository for SqliteKeyRepository {
    async fn create_key(&self, key: Key) -> Result<(), CredentialError> {
        let payload = serde_json::to_vec(&key).map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let connection = self.connection.lock().await;
        let result = connection.execute(
            "INSERT INTO keys (id, org_id, workflow_id, name, is_revoked, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.id.as_str(),
                key.org_id.as_str(),
                key.workflow_id.as_ref().map(WorkflowId::as_str),
                key.name,
                i64::from(key.is_revoked),
                payload,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                Err(CredentialError::AlreadyExists {
                    org_id: key.org_id.as_str().to_string(),
                    workflow_id: key.workflow_id.as_ref().map(|id| id.as_str().to_string()),
                    name: key.name.clone(),
                })
            }
            Err(err) => Err(to_store_err(SqliteStoreError::from(err))),
        }
    }

    async fn find_key(
        &self,
        org_id: &OrgId,
        workflow_id: Option<&WorkflowId>,
        name: &str,
    ) -> Result<Option<Key>, CredentialError> {
        let connection = self.connection.lock().await;
        let payload: Option<Vec<u8>> = connection
            .query_row(
                "SELECT data_json FROM keys
                 WHERE org_id = ?1 AND workflow_id IS ?2 AND name = ?3 AND is_revoked = 0",
                params![org_id.as_str(), workflow_id.map(WorkflowId::as_str), name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let Some(payload) = payload else { return Ok(None) };
        let key = serde_json::from_slice(&payload).map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        Ok(Some(key))
    }

    async fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>, CredentialError> {
        let connection = self.connection.lock().await;
        let payload: Option<Vec<u8>> = connection
            .query_row("SELECT data_json FROM keys WHERE id = ?1", params![key_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let Some(payload) = payload else { return Ok(None) };
        let key = serde_json::from_slice(&payload).map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        Ok(Some(key))
    }

    async fn list_visible_keys(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<Key>, CredentialError> {
        let connection = self.connection.lock().await;
        let mut statement = connection
            .prepare(
                "SELECT data_json FROM keys
                 WHERE org_id = ?1 AND (workflow_id = ?2 OR workflow_id IS NULL)",
            )
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let rows = statement
            .query_map(params![org_id.as_str(), workflow_id.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let mut keys = Vec::new();
        for row in rows {
            let payload = row.map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
            keys.push(serde_json::from_slice::<Key>(&payload).map_err(|err| to_store_err(SqliteStoreError::from(err)))?);
        }
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    async fn rotate_key(
        &self,
        key_id: &KeyId,
        encrypted_value: String,
        iv: String,
        rotated_at: Timestamp,
    ) -> Result<(), CredentialError> {
        let mut key = self
            .get_key(key_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.encrypted_value = encrypted_value;
        key.iv = iv;
        key.last_rotated_at = Some(rotated_at);
        self.overwrite(&key).await
    }

    async fn revoke_key(&self, key_id: &KeyId) -> Result<(), CredentialError> {
        let mut key = self
            .get_key(key_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.is_revoked = true;
        self.overwrite(&key).await
    }

    async fn touch_last_used(&self, key_id: &KeyId, used_at: Timestamp) -> Result<(), CredentialError> {
        let mut key = self
            .get_key(key_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(key_id.as_str().to_string()))?;
        key.last_used_at = Some(used_at);
        self.overwrite(&key).await
    }

    async fn append_audit_entry(&self, entry: KeyAuditEntry) -> Result<(), CredentialError> {
        let payload = serde_json::to_vec(&entry).map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO key_audit_entries (id, key_id, data_json) VALUES (?1, ?2, ?3)",
                params![entry.id.as_str(), entry.key_id.as_str(), payload],
            )
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        Ok(())
    }

    async fn list_audit_entries(&self, key_id: &KeyId) -> Result<Vec<KeyAuditEntry>, CredentialError> {
        let connection = self.connection.lock().await;
        let mut statement = connection
            .prepare("SELECT data_json FROM key_audit_entries WHERE key_id = ?1 ORDER BY rowid ASC")
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let rows = statement
            .query_map(params![key_id.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let mut entries = Vec::new();
        for row in rows {
            let payload = row.map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
            entries.push(
                serde_json::from_slice::<KeyAuditEntry>(&payload)
                    .map_err(|err| to_store_err(SqliteStoreError::from(err)))?,
            );
        }
        Ok(entries)
    }
}

impl SqliteKeyRepository {
    async fn overwrite(&self, key: &Key) -> Result<(), CredentialError> {
        let payload = serde_json::to_vec(key).map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        let connection = self.connection.lock().await;
        connection
            .execute(
                "UPDATE keys SET is_revoked = ?2, data_json = ?3 WHERE id = ?1",
                params![key.id.as_str(), i64::from(key.is_revoked), payload],
            )
            .map_err(|err| to_store_err(SqliteStoreError::from(err)))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use workflow_credentials::StorageMode;

    use super::*;

    fn sample_key(name: &str, org_id: &str, workflow_id: Option<&str>) -> Key {
        Key {
            id: KeyId::new(nanoid::nanoid!(10)),
            org_id: OrgId::new(org_id),
            workflow_id: workflow_id.map(WorkflowId::new),
            name: name.to_string(),
            provider: "openai".to_string(),
            key_type: "api_key".to_string(),
            encrypted_value: "cipher".to_string(),
            iv: "iv".to_string(),
            algorithm: "aes-256-gcm".to_string(),
            storage_mode: StorageMode::Cloud,
            expires_at: None,
            is_revoked: false,
            last_used_at: None,
            last_rotated_at: None,
            created_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        let key = sample_key("k", "org-1", None);
        repo.create_key(key.clone()).await.unwrap();
        let found = repo.find_key(&OrgId::new("org-1"), None, "k").await.unwrap();
        assert_eq!(found, Some(key));
    }

    #[tokio::test]
    async fn create_key_rejects_duplicate_scope() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        repo.create_key(sample_key("k", "org-1", None)).await.unwrap();
        let result = repo.create_key(sample_key("k", "org-1", None)).await;
        assert!(matches!(result, Err(CredentialError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn workflow_scoped_and_org_wide_keys_can_share_a_name() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        repo.create_key(sample_key("k", "org-1", None)).await.unwrap();
        repo.create_key(sample_key("k", "org-1", Some("wf-1"))).await.unwrap();
        let visible = repo.list_visible_keys(&OrgId::new("org-1"), &WorkflowId::new("wf-1")).await.unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn revoke_then_create_same_scope_succeeds() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        let key = sample_key("k", "org-1", None);
        let key_id = key.id.clone();
        repo.create_key(key).await.unwrap();
        repo.revoke_key(&key_id).await.unwrap();
        repo.create_key(sample_key("k", "org-1", None)).await.unwrap();
    }

    #[tokio::test]
    async fn rotate_updates_ciphertext_and_timestamp() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        let key = sample_key("k", "org-1", None);
        let key_id = key.id.clone();
        repo.create_key(key).await.unwrap();
        let now = Timestamp::now();
        repo.rotate_key(&key_id, "new-cipher".to_string(), "new-iv".to_string(), now).await.unwrap();
        let loaded = repo.get_key(&key_id).await.unwrap().unwrap();
        assert_eq!(loaded.encrypted_value, "new-cipher");
        assert_eq!(loaded.last_rotated_at, Some(now));
    }

    #[tokio::test]
    async fn audit_entries_filter_by_key_and_preserve_order() {
        let repo = SqliteKeyRepository::open_in_memory().unwrap();
        let key_id = KeyId::new("key-1");
        for suffix in ["a1", "a2", "a3"] {
            repo.append_audit_entry(KeyAuditEntry {
                id: workflow_core::ids::AuditEntryId::new(suffix),
                key_id: key_id.clone(),
                action: workflow_credentials::KeyAction::Created,
                performed_by: None,
                ip_address: None,
                user_agent: None,
                metadata: None,
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();
        }
        let entries = repo.list_audit_entries(&key_id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id.as_str(), "a1");
    }
}
