// workflow-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run Repository
// Description: Durable RunRepository backed by SQLite, one JSON snapshot
// column per aggregate.
// Purpose: Give the engine a concrete, durable persistence implementation.
// Dependencies: rusqlite (bundled), serde_json, tokio::sync::Mutex,
// workflow-core
// ============================================================================

//! ## Overview
//! WAL journal mode, a `busy_timeout` pragma, `CREATE TABLE IF NOT EXISTS`
//! schema initialization, canonical JSON snapshots per row — the four-method
//! [`RunRepository`] contract `workflow-core` needs. Access is serialized
//! behind a single `tokio::sync::Mutex` around one connection, which is
//! sufficient for the engine's write volume (one row per run transition,
//! not a high-throughput event stream).

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tokio::sync::Mutex;
use workflow_core::RunRepository;
use workflow_core::interfaces::StoreError;
use workflow_core::ids::VersionNumber;
use workflow_core::ids::WorkflowId;
use workflow_core::ids::RunId;
use workflow_core::model::Run;
use workflow_core::model::Workflow;
use workflow_core::model::WorkflowVersion;

use crate::error::SqliteStoreError;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// A durable [`RunRepository`] backed by one `SQLite` connection.
pub struct SqliteRunRepository {
    connection: Mutex<Connection>,
}

impl SqliteRunRepository {
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

    /// Inserts or replaces a workflow row. Not part of [`RunRepository`];
    /// hosts use this to seed/update workflow metadata that `workflow-core`
    /// itself never constructs.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] on I/O or serialization failure.
    pub async fn put_workflow(&self, workflow: &Workflow) -> Result<(), SqliteStoreError> {
        let payload = serde_json::to_vec(workflow)?;
        let connection = self.connection.lock().await;
        connection.execute(
            "INSERT INTO workflows (id, org_id, data_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET org_id = excluded.org_id, data_json = excluded.data_json",
            params![workflow.id.as_str(), workflow.org_id.as_str(), payload],
        )?;
        Ok(())
    }

    /// Inserts or replaces a workflow version row (immutable once published;
    /// callers are expected not to overwrite a published version).
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] on I/O or serialization failure.
    pub async fn put_version(&self, version: &WorkflowVersion) -> Result<(), SqliteStoreError> {
        let payload = serde_json::to_vec(version)?;
        let connection = self.connection.lock().await;
        connection.execute(
            "INSERT INTO workflow_versions (workflow_id, version, data_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(workflow_id, version) DO UPDATE SET data_json = excluded.data_json",
            params![version.workflow_id.as_str(), i64::from(version.version.value()), payload],
        )?;
        Ok(())
    }

    /// Lists every run for a workflow, newest-first by `started_at`. Not
    /// part of [`RunRepository`]; hosts use this for cursor-paginated
    /// listing endpoints, which sit above the four-method engine contract.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] on I/O or deserialization failure.
    pub async fn list_runs(&self, workflow_id: &WorkflowId) -> Result<Vec<Run>, SqliteStoreError> {
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare("SELECT data_json FROM runs WHERE workflow_id = ?1")?;
        let rows = statement.query_map(params![workflow_id.as_str()], |row| row.get::<_, Vec<u8>>(0))?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(serde_json::from_slice::<Run>(&row?)?);
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.as_str().cmp(a.id.as_str())));
        Ok(runs)
    }

    /// Finds a public workflow by its `public_slug`. Not part of
    /// [`RunRepository`]; the public-run gate needs slug lookup, which sits
    /// outside the interpreter's own id-keyed access pattern.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] on I/O or deserialization failure.
    pub async fn find_workflow_by_slug(&self, slug: &str) -> Result<Option<Workflow>, SqliteStoreError> {
        let connection = self.connection.lock().await;
        let mut statement = connection.prepare("SELECT data_json FROM workflows")?;
        let rows = statement.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
        for row in rows {
            let workflow = serde_json::from_slice::<Workflow>(&row?)?;
            if workflow.public_slug.as_deref() == Some(slug) {
                return Ok(Some(workflow));
            }
        }
        Ok(None)
    }
}

fn apply_pragmas(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    connection.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            data_json BLOB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS workflow_versions (
            workflow_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            data_json BLOB NOT NULL,
            PRIMARY KEY (workflow_id, version)
        );
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            data_json BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs (workflow_id);",
    )?;
    Ok(())
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let connection = self.connection.lock().await;
        let payload: Option<Vec<u8>> = connection
            .query_row("SELECT data_json FROM runs WHERE id = ?1", params![run_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(payload) = payload else { return Ok(None) };
        let run = serde_json::from_slice(&payload).map_err(SqliteStoreError::from)?;
        Ok(Some(run))
    }

    async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(run).map_err(SqliteStoreError::from)?;
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO runs (id, workflow_id, data_json) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data_json = excluded.data_json",
                params![run.id.as_str(), run.workflow_id.as_str(), payload],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }

    async fn load_version(
        &self,
        workflow_id: &WorkflowId,
        version: VersionNumber,
    ) -> Result<Option<WorkflowVersion>, StoreError> {
        let connection = self.connection.lock().await;
        let payload: Option<Vec<u8>> = connection
            .query_row(
                "SELECT data_json FROM workflow_versions WHERE workflow_id = ?1 AND version = ?2",
                params![workflow_id.as_str(), i64::from(version.value())],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(payload) = payload else { return Ok(None) };
        let version = serde_json::from_slice(&payload).map_err(SqliteStoreError::from)?;
        Ok(Some(version))
    }

    async fn load_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let connection = self.connection.lock().await;
        let payload: Option<Vec<u8>> = connection
            .query_row("SELECT data_json FROM workflows WHERE id = ?1", params![workflow_id.as_str()], |row| {
                row.get(0)
            })
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(payload) = payload else { return Ok(None) };
        let workflow = serde_json::from_slice(&payload).map_err(SqliteStoreError::from)?;
        Ok(Some(workflow))
    }
}
