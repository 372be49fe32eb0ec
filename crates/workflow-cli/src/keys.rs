// workflow-cli/src/keys.rs
// ============================================================================
// Module: `keys` Subcommand
// Description: Credential store administration: create, get, rotate,
//              revoke, list.
// Purpose: Give an operator a local tool over the encrypted key store
//          without standing up the HTTP server.
// Dependencies: clap, serde_json, workflow-core, workflow-credentials,
//               workflow-store-sqlite
// ============================================================================

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use clap::Args;
use clap::Subcommand;
use clap::ValueEnum;
use workflow_core::ids::KeyId;
use workflow_core::ids::OrgId;
use workflow_core::ids::WorkflowId;
use workflow_credentials::AuditContext;
use workflow_credentials::CredentialStore;
use workflow_credentials::StorageMode;
use workflow_store_sqlite::SqliteKeyRepository;

/// Credential store subcommands.
#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Create and encrypt a new key.
    Create(CreateArgs),
    /// Resolve a key's plaintext value through the scoped lookup order.
    Get(GetArgs),
    /// List every key visible to an org/workflow scope (metadata only).
    List(ListArgs),
    /// Replace a key's ciphertext with a new plaintext value.
    Rotate(RotateArgs),
    /// Soft-revoke a key by id.
    Revoke(RevokeArgs),
}

/// CLI mirror of [`workflow_credentials::StorageMode`].
#[derive(ValueEnum, Clone, Copy, Debug)]
enum StorageModeArg {
    Cloud,
    Local,
}

impl From<StorageModeArg> for StorageMode {
    fn from(value: StorageModeArg) -> Self {
        match value {
            StorageModeArg::Cloud => Self::Cloud,
            StorageModeArg::Local => Self::Local,
        }
    }
}

/// Shared flags for reaching the file-backed key store.
#[derive(Args, Debug)]
struct StoreArgs {
    /// SQLite database path for the encrypted key store.
    #[arg(long, value_name = "PATH")]
    keys_db: PathBuf,
    /// Hex-encoded 32-byte master key. Keys created under one master key
    /// cannot be decrypted under another.
    #[arg(long, value_name = "HEX")]
    master_key_hex: String,
}

/// Arguments for `workflow-cli keys create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Owning organization.
    #[arg(long)]
    org_id: String,
    /// Scoping workflow; omit for an org-wide key.
    #[arg(long)]
    workflow_id: Option<String>,
    /// Author-facing name, e.g. `openai_api_key`.
    #[arg(long)]
    name: String,
    /// Free-text provider label, e.g. `openai`.
    #[arg(long)]
    provider: String,
    /// Free-text key type, e.g. `api_key`.
    #[arg(long)]
    key_type: String,
    /// Plaintext value to encrypt and store.
    #[arg(long)]
    value: String,
    /// Which handlers the decrypted value may reach.
    #[arg(long, value_enum, default_value = "cloud")]
    storage_mode: StorageModeArg,
}

/// Arguments for `workflow-cli keys get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Owning organization.
    #[arg(long)]
    org_id: String,
    /// Workflow scope to try first; falls back to the org-wide key.
    #[arg(long)]
    workflow_id: Option<String>,
    /// Key name to resolve.
    #[arg(long)]
    name: String,
}

/// Arguments for `workflow-cli keys list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Owning organization.
    #[arg(long)]
    org_id: String,
    /// Workflow scope combined with the org-wide set.
    #[arg(long)]
    workflow_id: String,
}

/// Arguments for `workflow-cli keys rotate`.
#[derive(Args, Debug)]
pub struct RotateArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Id of the key to rotate.
    #[arg(long)]
    key_id: String,
    /// New plaintext value.
    #[arg(long)]
    value: String,
}

/// Arguments for `workflow-cli keys revoke`.
#[derive(Args, Debug)]
pub struct RevokeArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Id of the key to revoke.
    #[arg(long)]
    key_id: String,
}

fn hex_decode(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 {
        return None;
    }
    (0..input.len()).step_by(2).map(|i| u8::from_str_radix(&input[i..i + 2], 16).ok()).collect()
}

fn open_store(args: &StoreArgs) -> Result<CredentialStore<SqliteKeyRepository>, String> {
    open_store_at(&args.keys_db, &args.master_key_hex)
}

fn open_store_at(path: &Path, master_key_hex: &str) -> Result<CredentialStore<SqliteKeyRepository>, String> {
    let bytes = hex_decode(master_key_hex).ok_or("--master-key-hex must be hex")?;
    let array: [u8; 32] = bytes.try_into().map_err(|_| "--master-key-hex must decode to 32 bytes".to_string())?;
    let master_key = workflow_credentials::MasterKey::from_bytes(array);
    let repo = SqliteKeyRepository::open(path).map_err(|err| err.to_string())?;
    Ok(CredentialStore::with_noop_audit(repo, master_key))
}

fn print_line(text: &str) -> Result<(), String> {
    writeln!(std::io::stdout(), "{text}").map_err(|err| err.to_string())
}

/// Dispatches a `keys` subcommand.
///
/// # Errors
/// Returns a description of whatever step of store setup or the underlying
/// credential operation failed.
pub async fn dispatch(command: KeysCommand) -> Result<(), String> {
    match command {
        KeysCommand::Create(args) => create(args).await,
        KeysCommand::Get(args) => get(args).await,
        KeysCommand::List(args) => list(args).await,
        KeysCommand::Rotate(args) => rotate(args).await,
        KeysCommand::Revoke(args) => revoke(args).await,
    }
}

async fn create(args: CreateArgs) -> Result<(), String> {
    let store = open_store(&args.store)?;
    let key = store
        .create_key(
            OrgId::new(args.org_id),
            args.workflow_id.map(WorkflowId::new),
            args.name,
            args.provider,
            args.key_type,
            &args.value,
            args.storage_mode.into(),
            None,
            &AuditContext::default(),
        )
        .await
        .map_err(|err| err.to_string())?;
    print_line(&format!("created key {} ({})", key.id.as_str(), key.name))
}

async fn get(args: GetArgs) -> Result<(), String> {
    let store = open_store(&args.store)?;
    let workflow_id = args.workflow_id.map(WorkflowId::new);
    let value = store
        .get_key(&OrgId::new(args.org_id), &args.name, workflow_id.as_ref(), &AuditContext::default())
        .await
        .map_err(|err| err.to_string())?;
    match value {
        Some(plaintext) => print_line(&plaintext),
        None => Err(format!("no usable key named {} in this scope", args.name)),
    }
}

async fn list(args: ListArgs) -> Result<(), String> {
    let store = open_store(&args.store)?;
    let keys = store
        .list_visible_keys(&OrgId::new(args.org_id), &WorkflowId::new(args.workflow_id))
        .await
        .map_err(|err| err.to_string())?;
    for key in keys {
        let scope = key.workflow_id.as_ref().map_or_else(|| "org-wide".to_string(), |id| id.to_string());
        print_line(&format!(
            "{} name={} provider={} scope={} revoked={}",
            key.id.as_str(),
            key.name,
            key.provider,
            scope,
            key.is_revoked
        ))?;
    }
    Ok(())
}

async fn rotate(args: RotateArgs) -> Result<(), String> {
    let store = open_store(&args.store)?;
    store
        .rotate_key(&KeyId::new(args.key_id.clone()), &args.value, &AuditContext::default())
        .await
        .map_err(|err| err.to_string())?;
    print_line(&format!("rotated key {}", args.key_id))
}

async fn revoke(args: RevokeArgs) -> Result<(), String> {
    let store = open_store(&args.store)?;
    store.revoke_key(&KeyId::new(args.key_id.clone()), &AuditContext::default()).await.map_err(|err| err.to_string())?;
    print_line(&format!("revoked key {}", args.key_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn hex_decode_rejects_odd_length() {
        assert_eq!(hex_decode("abc"), None);
    }

    #[tokio::test]
    async fn open_store_round_trips_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("keys.sqlite");
        let hex = "00".repeat(32);
        let store = open_store_at(&db_path, &hex).unwrap();
        let key = store
            .create_key(
                OrgId::new("org-1"),
                None,
                "svc".to_string(),
                "acme".to_string(),
                "api_key".to_string(),
                "s3cr3t",
                StorageMode::Cloud,
                None,
                &AuditContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(key.name, "svc");
        let resolved = store.get_key(&OrgId::new("org-1"), "svc", None, &AuditContext::default()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("s3cr3t"));
    }
}
