// workflow-cli/src/main.rs
// ============================================================================
// Module: Workflow Engine CLI
// Description: Command dispatcher over the server, the offline interpreter,
//              and credential-store administration.
// Purpose: Give an operator a single local binary for starting the HTTP
//          surface, replaying a workflow definition without a server, and
//          managing encrypted keys via nested serve/run/keys subcommand
//          groups.
// Dependencies: clap, tokio, workflow-core, workflow-credentials,
//               workflow-events, workflow-handlers, workflow-server,
//               workflow-store-sqlite
// ============================================================================

//! ## Overview
//! `workflow-cli` does not duplicate any algorithm: `serve` wires the same
//! collaborators `workflow-server`'s own binary wires and calls into
//! `workflow_server::{build_router, serve}`; `run trigger`/`run resume`
//! build the identical `Interpreter` over a temporary or file-backed SQLite
//! store and drive it directly, without HTTP, for local testing of a
//! workflow definition; `keys` drives `workflow_credentials::CredentialStore`
//! against a chosen backend. Every subcommand is a thin composition of
//! library calls already exercised by the other crates' own tests.

mod keys;
mod run;
mod serve;

use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;

/// Command-line entry point for the workflow engine.
#[derive(Parser, Debug)]
#[command(name = "workflow-cli", disable_version_flag = true)]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API server.
    Serve(serve::ServeArgs),
    /// Offline workflow execution utilities (no HTTP server required).
    Run {
        /// Selected run subcommand.
        #[command(subcommand)]
        command: run::RunCommand,
    },
    /// Encrypted credential store administration utilities.
    Keys {
        /// Selected keys subcommand.
        #[command(subcommand)]
        command: keys::KeysCommand,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Run { command } => run::dispatch(command).await,
        Commands::Keys { command } => keys::dispatch(command).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let _ = writeln!(std::io::stderr(), "workflow-cli: {message}");
            ExitCode::FAILURE
        }
    }
}
