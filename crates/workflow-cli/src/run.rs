// workflow-cli/src/run.rs
// ============================================================================
// Module: `run` Subcommand
// Description: Offline trigger/resume of a workflow definition, no HTTP
//              server involved.
// Purpose: Let an author replay the exact scenarios an end-to-end example
//          describes against a local workflow/version JSON pair, for use
//          in authoring tools and CI.
// Dependencies: clap, serde_json, workflow-core, workflow-credentials,
//               workflow-events, workflow-handlers, workflow-store-sqlite
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use serde_json::Value;
use workflow_core::CancellationToken;
use workflow_core::Interpreter;
use workflow_core::TriggerRequest;
use workflow_core::ids::RunId;
use workflow_core::model::TriggerType;
use workflow_core::model::Workflow;
use workflow_core::model::WorkflowVersion;
use workflow_credentials::CredentialStore;
use workflow_credentials::InMemoryKeyStore;
use workflow_credentials::KeyRepository;
use workflow_credentials::MasterKey;
use workflow_events::EventRegistry;
use workflow_store_sqlite::SqliteKeyRepository;
use workflow_store_sqlite::SqliteRunRepository;

/// Offline run subcommands.
#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Trigger a fresh run from a workflow/version definition pair.
    Trigger(TriggerArgs),
    /// Resume a paused run previously triggered against a file-backed store.
    Resume(ResumeArgs),
}

/// CLI mirror of [`workflow_core::model::TriggerType`].
#[derive(ValueEnum, Clone, Copy, Debug)]
enum TriggerTypeArg {
    Interactive,
    Api,
    Schedule,
    Hook,
    Vision,
}

impl From<TriggerTypeArg> for TriggerType {
    fn from(value: TriggerTypeArg) -> Self {
        match value {
            TriggerTypeArg::Interactive => Self::Interactive,
            TriggerTypeArg::Api => Self::Api,
            TriggerTypeArg::Schedule => Self::Schedule,
            TriggerTypeArg::Hook => Self::Hook,
            TriggerTypeArg::Vision => Self::Vision,
        }
    }
}

/// Arguments for `workflow-cli run trigger`.
#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Path to a JSON-serialized [`Workflow`].
    #[arg(long, value_name = "PATH")]
    workflow: PathBuf,
    /// Path to a JSON-serialized [`WorkflowVersion`] to execute.
    #[arg(long, value_name = "PATH")]
    version: PathBuf,
    /// Path to a JSON trigger payload (becomes `$event`); defaults to `null`.
    #[arg(long, value_name = "PATH")]
    event: Option<PathBuf>,
    /// What caused this run.
    #[arg(long, value_enum, default_value = "api")]
    trigger_type: TriggerTypeArg,
    /// Execution environment identifier, becomes `$run.platform`.
    #[arg(long)]
    platform: Option<String>,
    /// Device identifier, becomes `$run.deviceId`.
    #[arg(long)]
    device_id: Option<String>,
    /// File-backed SQLite path for run persistence; omit for an ephemeral
    /// in-memory store (fine unless the run pauses and needs a later
    /// `run resume`).
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,
    /// File-backed SQLite path for the credential store; omit to run with
    /// an empty `$secrets` scope.
    #[arg(long, value_name = "PATH")]
    keys_db: Option<PathBuf>,
    /// Hex-encoded 32-byte master key for the credential store; generated
    /// ephemerally when omitted (only matters if `--keys-db` is set).
    #[arg(long, value_name = "HEX")]
    master_key_hex: Option<String>,
}

/// Arguments for `workflow-cli run resume`.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// File-backed SQLite path the paused run was persisted to.
    #[arg(long, value_name = "PATH")]
    store: PathBuf,
    /// Run id to resume.
    #[arg(long)]
    run_id: String,
    /// Resume marker token, from the paused run's `resume_marker.token`.
    #[arg(long)]
    token: String,
    /// Path to a JSON value to write at the paused block's bind path.
    #[arg(long, value_name = "PATH")]
    value: Option<PathBuf>,
    /// File-backed SQLite path for the credential store; omit to run with
    /// an empty `$secrets` scope.
    #[arg(long, value_name = "PATH")]
    keys_db: Option<PathBuf>,
    /// Hex-encoded 32-byte master key for the credential store.
    #[arg(long, value_name = "HEX")]
    master_key_hex: Option<String>,
}

/// Dispatches a `run` subcommand.
///
/// # Errors
/// Returns a description of whatever step of loading, wiring, or execution
/// failed.
pub async fn dispatch(command: RunCommand) -> Result<(), String> {
    match command {
        RunCommand::Trigger(args) => trigger(args).await,
        RunCommand::Resume(args) => resume(args).await,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let bytes = std::fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|err| format!("{}: {err}", path.display()))
}

fn read_json_or_null(path: Option<&Path>) -> Result<Value, String> {
    match path {
        Some(path) => read_json(path),
        None => Ok(Value::Null),
    }
}

async fn open_run_store(store: Option<&Path>) -> Result<SqliteRunRepository, String> {
    match store {
        Some(path) => SqliteRunRepository::open(path).map_err(|err| err.to_string()),
        None => SqliteRunRepository::open_in_memory().map_err(|err| err.to_string()),
    }
}

fn open_key_repository(keys_db: Option<&Path>) -> Result<Box<dyn KeyRepository>, String> {
    match keys_db {
        Some(path) => {
            let repo = SqliteKeyRepository::open(path).map_err(|err| err.to_string())?;
            Ok(Box::new(repo))
        }
        None => Ok(Box::new(InMemoryKeyStore::new())),
    }
}

fn build_master_key(master_key_hex: Option<&str>) -> Result<MasterKey, String> {
    match master_key_hex {
        Some(hex) => {
            let bytes = hex_decode(hex).ok_or("--master-key-hex must be hex")?;
            let array: [u8; 32] = bytes.try_into().map_err(|_| "--master-key-hex must decode to 32 bytes".to_string())?;
            Ok(MasterKey::from_bytes(array))
        }
        None => Ok(MasterKey::generate()),
    }
}

fn hex_decode(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len()).step_by(2).map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok()).collect()
}

fn print_run(run: &workflow_core::model::Run) -> Result<(), String> {
    let text = serde_json::to_string_pretty(run).map_err(|err| err.to_string())?;
    writeln!(std::io::stdout(), "{text}").map_err(|err| err.to_string())
}

async fn trigger(args: TriggerArgs) -> Result<(), String> {
    let workflow: Workflow = read_json(&args.workflow)?;
    let version: WorkflowVersion = read_json(&args.version)?;
    if version.workflow_id != workflow.id {
        return Err("version.workflow_id does not match workflow.id".to_string());
    }
    let event = read_json_or_null(args.event.as_deref())?;

    let repo = Arc::new(open_run_store(args.store.as_deref()).await?);
    repo.put_workflow(&workflow).await.map_err(|err| err.to_string())?;
    repo.put_version(&version).await.map_err(|err| err.to_string())?;

    let master_key = build_master_key(args.master_key_hex.as_deref())?;
    let key_repository = open_key_repository(args.keys_db.as_deref())?;
    let credentials = Arc::new(CredentialStore::with_noop_audit(key_repository, master_key));
    let events = Arc::new(EventRegistry::new());
    let registry = Arc::new(workflow_handlers::build_registry_for_platform("cli"));
    let engine = Interpreter::new(repo, credentials, events, registry);

    let request = TriggerRequest {
        workflow_id: workflow.id.clone(),
        org_id: workflow.org_id.clone(),
        version: version.version,
        run_id: None,
        trigger_type: args.trigger_type.into(),
        event,
        platform: args.platform,
        device_id: args.device_id,
        paths: BTreeMap::new(),
        metadata: BTreeMap::new(),
    };
    let run = engine.trigger(request, CancellationToken::new()).await.map_err(|err| err.to_string())?;
    print_run(&run)
}

async fn resume(args: ResumeArgs) -> Result<(), String> {
    let value = read_json_or_null(args.value.as_deref())?;
    let repo = Arc::new(SqliteRunRepository::open(&args.store).map_err(|err| err.to_string())?);

    let master_key = build_master_key(args.master_key_hex.as_deref())?;
    let key_repository = open_key_repository(args.keys_db.as_deref())?;
    let credentials = Arc::new(CredentialStore::with_noop_audit(key_repository, master_key));
    let events = Arc::new(EventRegistry::new());
    let registry = Arc::new(workflow_handlers::build_registry_for_platform("cli"));
    let engine = Interpreter::new(repo, credentials, events, registry);

    let run_id = RunId::new(args.run_id);
    let run = engine
        .resume(&run_id, &args.token, value, CancellationToken::new())
        .await
        .map_err(|err| err.to_string())?;
    print_run(&run)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn hex_decode_round_trips() {
        assert_eq!(hex_decode("00ff"), Some(vec![0x00, 0xff]));
        assert_eq!(hex_decode("0"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn master_key_requires_32_bytes() {
        assert!(build_master_key(Some("00")).is_err());
    }
}
