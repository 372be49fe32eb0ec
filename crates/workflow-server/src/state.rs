// workflow-server/src/state.rs
// ============================================================================
// Module: Shared Application State
// Description: The concrete collaborator wiring every handler shares.
// Purpose: Instantiate `Interpreter<SqliteRunRepository,
// CredentialStore<InMemoryKeyStore>, EventRegistry>` once at
// startup and hand out clones of its `Arc` to every handler.
// Dependencies: workflow-core, workflow-credentials, workflow-events,
// workflow-store-sqlite
// ============================================================================

//! ## Overview
//! `Interpreter`'s generics are monomorphized (no `dyn` seam), so the
//! concrete type is named once, here, and never again outside this crate.
//! `AppState` also holds the one collaborator the trait-object `Interpreter`
//! can't reach through `RunRepository`: `SqliteRunRepository::list_runs` and
//! `::find_workflow_by_slug`, which are inherent methods the trait doesn't
//! declare (list/slug lookup aren't part of the single-run persistence
//! seam). A per-run cancellation-token map lets `POST /runs/:id/cancel`
//! reach a run that is still executing in another task.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use workflow_core::CancellationToken;
use workflow_core::Interpreter;
use workflow_core::audit::AuditSink;
use workflow_core::handler::HandlerRegistry;
use workflow_core::ids::RunId;
use workflow_credentials::CredentialStore;
use workflow_credentials::KeyRepository;
use workflow_events::EventRegistry;
use workflow_events::RateLimiter;
use workflow_store_sqlite::SqliteRunRepository;

/// The concrete, monomorphized engine this server drives. The credential
/// backend is boxed (rather than a second concrete type parameter) because
/// `main.rs` picks in-memory vs. `SQLite` from configuration at startup,
/// after this alias has already fixed `Interpreter`'s type parameters.
pub type Engine = Interpreter<SqliteRunRepository, CredentialStore<Box<dyn KeyRepository>>, EventRegistry>;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    /// The wired interpreter (trigger/resume).
    pub engine: Arc<Engine>,
    /// Direct handle to the run/version/workflow store, for the
    /// list/slug-lookup operations `RunRepository` doesn't expose.
    pub repo: Arc<SqliteRunRepository>,
    /// Event fan-out registry, shared by SSE and WebSocket-style transports.
    pub events: Arc<EventRegistry>,
    /// Rate limiter guarding authenticated/internal endpoints.
    pub internal_rate_limiter: Arc<RateLimiter>,
    /// Rate limiter guarding the public-run gate.
    pub public_rate_limiter: Arc<RateLimiter>,
    /// Ambient audit sink, shared with the credential store.
    pub audit: Arc<dyn AuditSink>,
    /// Cancellation handles for runs currently executing in-process, keyed
    /// by run id. A run not present here has already finished or was never
    /// started by this process.
    pub cancellations: Arc<AsyncMutex<BTreeMap<RunId, CancellationToken>>>,
    /// The handler registry used to build each `Engine`'s run context,
    /// surfaced so handlers can validate trigger requests up front.
    pub registry: Arc<HandlerRegistry>,
}

impl AppState {
    /// Registers a cancellation token for a run this process is about to
    /// execute, so a later `POST /runs/:id/cancel` can reach it.
    pub async fn register_cancellation(&self, run_id: RunId, token: CancellationToken) {
        self.cancellations.lock().await.insert(run_id, token);
    }

    /// Removes a run's cancellation handle once it has finished executing.
    pub async fn clear_cancellation(&self, run_id: &RunId) {
        self.cancellations.lock().await.remove(run_id);
    }

    /// Cancels an in-process run if this process holds its token. Returns
    /// `false` when the run is unknown to this process (already finished,
    /// or running elsewhere).
    pub async fn cancel_run(&self, run_id: &RunId) -> bool {
        if let Some(token) = self.cancellations.lock().await.get(run_id) {
            token.cancel();
            true
        } else {
            false
        }
    }
}
