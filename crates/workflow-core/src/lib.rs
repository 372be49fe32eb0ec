// workflow-core/src/lib.rs
// ============================================================================
// Module: Workflow Core Library
// Description: Public API surface for the workflow execution engine's core.
// Purpose: Expose the data model, context, resolver, condition evaluator,
//          handler contract, interpreter, and persistence interfaces.
// Dependencies: crate::{block_result, cancel, condition, context, error,
//               events, handler, ids, interfaces, interpreter, limits,
//               model, resolver, time, typo, validate}
// ============================================================================

//! ## Overview
//! `workflow-core` holds the block interpreter, the context and reference
//! model, run lifecycle types, and the event shapes they emit. It is
//! backend-agnostic — concrete handlers, credential storage, durable
//! persistence, and transports are separate crates that depend on the
//! interfaces defined here, never the reverse.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod block_result;
pub mod cancel;
pub mod condition;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod ids;
pub mod interfaces;
pub mod interpreter;
pub mod limits;
pub mod model;
pub mod resolver;
pub mod time;
pub mod typo;
pub mod validate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use block_result::BlockResult;
pub use block_result::Completion;
pub use block_result::GotoDirective;
pub use block_result::HandlerResult;
pub use block_result::PauseDirective;
pub use block_result::PauseKind;
pub use cancel::CancellationToken;
pub use context::WorkflowContext;
pub use error::EngineError;
pub use error::ErrorKind;
pub use error::HandlerError;
pub use events::TimestampedEvent;
pub use events::WorkflowEvent;
pub use handler::BlockHandler;
pub use handler::HandlerRegistry;
pub use interfaces::EventPublisher;
pub use interfaces::PublishError;
pub use interfaces::RunRepository;
pub use interfaces::SecretError;
pub use interfaces::SecretResolver;
pub use interfaces::StoreError;
pub use interpreter::Interpreter;
pub use interpreter::TriggerRequest;
pub use resolver::ResolverLocals;
pub use resolver::resolve;
pub use time::Timestamp;
pub use validate::SpecValidationError;
pub use validate::validate_version;
