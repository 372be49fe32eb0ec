// workflow-events/src/lib.rs
// ============================================================================
// Module: Workflow Events Library
// Description: Public API surface for event fan-out, the subscriber frame
// protocol, the rate limiter, and the public-run gate.
// Purpose: Expose the concrete collaborator that implements workflow-core's
// EventPublisher seam, plus the cross-cutting services the
// HTTP/SSE surface depends on.
// Dependencies: crate::{error, frames, public_gate, rate_limit, registry}
// ============================================================================

//! ## Overview
//! `workflow-events` bundles the three cross-cutting services the server's
//! HTTP surface depends on but the interpreter has no reason to know about:
//! the channel fan-out registry, the sliding-window rate limiter, and the
//! public-run gate. None of these depend on a transport — `workflow-server`
//! adapts them to axum's SSE and request-handling surface.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod frames;
pub mod public_gate;
pub mod rate_limit;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::PublicGateError;
pub use frames::ClientFrame;
pub use frames::ServerFrame;
pub use frames::apply_client_frame;
pub use frames::parse_client_frame;
pub use public_gate::PublicRun;
pub use public_gate::PublicRunGate;
pub use public_gate::hash_client_ip;
pub use rate_limit::RateLimitDecision;
pub use rate_limit::RateLimiter;
pub use rate_limit::spawn_reaper;
pub use registry::EventRegistry;
pub use registry::Subscriber;
pub use registry::SubscriberMeta;
