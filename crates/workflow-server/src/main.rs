// workflow-server/src/main.rs
// ============================================================================
// Module: Workflow Server Binary
// Description: Entry point: load configuration, wire every collaborator,
//              serve the HTTP API.
// Purpose: Thin binary over workflow_server::{build_router, serve}: load
//          configuration, then run.
// Dependencies: clap, tokio, workflow-core, workflow-credentials,
//               workflow-events, workflow-handlers, workflow-store-sqlite
// ============================================================================

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex as AsyncMutex;
use workflow_core::Interpreter;
use workflow_core::audit::AuditSink;
use workflow_core::audit::FileAuditSink;
use workflow_core::audit::NoopAuditSink;
use workflow_core::audit::StderrAuditSink;
use workflow_credentials::CredentialStore;
use workflow_credentials::InMemoryKeyStore;
use workflow_credentials::KeyRepository;
use workflow_credentials::MasterKey;
use workflow_events::EventRegistry;
use workflow_events::RateLimiter;
use workflow_events::spawn_reaper;
use workflow_server::ServerConfig;
use workflow_server::config::AuditSinkKind;
use workflow_server::config::StoreType;
use workflow_server::state::AppState;
use workflow_store_sqlite::SqliteKeyRepository;
use workflow_store_sqlite::SqliteRunRepository;

/// Command-line arguments for the workflow-server binary.
#[derive(Parser, Debug)]
#[command(name = "workflow-server", disable_version_flag = true)]
struct Cli {
    /// Path to a TOML configuration file (defaults to `workflow-server.toml`
    /// or `WORKFLOW_SERVER_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let _ = writeln!(std::io::stderr(), "workflow-server: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).map_err(|err| err.to_string())?;

    let repo = Arc::new(build_run_repository(&config)?);
    let audit: Arc<dyn AuditSink> = build_audit_sink(&config)?;
    let master_key = build_master_key(&config, &audit)?;
    let key_repository = build_key_repository(&config)?;
    let credentials = Arc::new(CredentialStore::new(key_repository, master_key, audit.clone()));
    let events = Arc::new(EventRegistry::new());
    let registry = Arc::new(workflow_handlers::build_registry_for_platform("server"));
    let engine = Arc::new(Interpreter::new(repo.clone(), credentials, events.clone(), registry.clone()));

    let internal_rate_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit.internal_per_minute));
    let public_rate_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit.public_per_minute));
    spawn_reaper(internal_rate_limiter.clone());
    spawn_reaper(public_rate_limiter.clone());

    let state = AppState {
        engine,
        repo,
        events,
        internal_rate_limiter,
        public_rate_limiter,
        audit,
        cancellations: Arc::new(AsyncMutex::new(std::collections::BTreeMap::new())),
        registry,
    };

    let router = workflow_server::build_router(state);
    writeln!(std::io::stdout(), "workflow-server listening on {}", config.http.bind).map_err(|err| err.to_string())?;
    workflow_server::serve(router, &config.http.bind).await.map_err(|err| err.to_string())
}

fn build_run_repository(config: &ServerConfig) -> Result<SqliteRunRepository, String> {
    match config.store.store_type {
        StoreType::Memory => SqliteRunRepository::open_in_memory().map_err(|err| err.to_string()),
        StoreType::Sqlite => {
            let path = config.store.path.as_deref().ok_or("store.path is required for a sqlite store")?;
            SqliteRunRepository::open(path).map_err(|err| err.to_string())
        }
    }
}

fn build_key_repository(config: &ServerConfig) -> Result<Box<dyn KeyRepository>, String> {
    match config.credentials.store_type {
        StoreType::Memory => Ok(Box::new(InMemoryKeyStore::new())),
        StoreType::Sqlite => {
            let path = config.credentials.path.as_deref().ok_or("credentials.path is required for a sqlite store")?;
            let repo = SqliteKeyRepository::open(path).map_err(|err| err.to_string())?;
            Ok(Box::new(repo))
        }
    }
}

fn build_master_key(config: &ServerConfig, audit: &Arc<dyn AuditSink>) -> Result<MasterKey, String> {
    match config.credentials.decode_master_key().map_err(|err| err.to_string())? {
        Some(bytes) => Ok(MasterKey::from_bytes(bytes)),
        None => {
            audit.record(
                &workflow_core::audit::AuditEvent::now("credentials.master_key_generated")
                    .with_detail("no credentials.master_key_hex configured; generated an ephemeral key for this process"),
            );
            Ok(MasterKey::generate())
        }
    }
}

fn build_audit_sink(config: &ServerConfig) -> Result<Arc<dyn AuditSink>, String> {
    match config.audit.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::Noop => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config.audit.path.as_deref().ok_or("audit.path is required for a file sink")?;
            FileAuditSink::new(path).map(|sink| Arc::new(sink) as Arc<dyn AuditSink>).map_err(|err| err.to_string())
        }
    }
}
