// workflow-server/src/lib.rs
// ============================================================================
// Module: Workflow Server Library
// Description: Router assembly and the public API surface `main.rs` drives.
// Purpose: Mount every route onto one axum `Router<AppState>`, so the
// binary's only job is wiring collaborators and serving.
// Dependencies: axum, tokio
// ============================================================================

//! ## Overview
//! A library crate that owns construction and routing, and a thin
//! `main.rs` binary that only loads configuration and calls into it.
//! `build_router` takes an already fully-wired [`state::AppState`] — this
//! crate knows nothing about how the engine, store, or credential backend
//! were chosen, only how to route HTTP onto them.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod state;
pub mod subscriber;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use axum::routing::post;

pub use config::ConfigError;
pub use config::ServerConfig;
pub use state::AppState;
pub use state::Engine;

/// Builds the full axum router over `state`, every route names.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/workflows/{id}/runs", post(handlers::runs::trigger))
        .route("/public/{slug}/runs", post(handlers::public::trigger_public))
        .route("/runs", get(handlers::runs::list_runs))
        .route("/runs/{id}", get(handlers::runs::get_run))
        .route("/runs/{id}/actions", post(handlers::runs::submit_action))
        .route("/runs/{id}/cancel", post(handlers::runs::cancel_run))
        .route("/events", get(handlers::events::sse_stream))
        .route("/events/ws", get(handlers::events::ws_stream))
        .with_state(state)
}

/// Serves `router` on `bind`, honoring ctrl-c for graceful shutdown.
///
/// # Errors
/// Returns an I/O error if the listener cannot bind, or if serving fails.
pub async fn serve(router: Router, bind: &str) -> std::io::Result<()> {
    let addr: SocketAddr =
        bind.parse().map_err(|err: std::net::AddrParseError| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
