// workflow-core/src/error.rs
// ============================================================================
// Module: Workflow Engine Errors
// Description: Cross-cutting error kinds and the interpreter's error type.
// Purpose: Give every fallible engine operation a single, stable error shape.
// Dependencies: thiserror, crate::interfaces
// ============================================================================

//! ## Overview
//! [`ErrorKind`] is the closed, cross-cutting classification that the server
//! boundary maps to HTTP status codes. [`EngineError`] is the interpreter's
//! concrete error type; every variant reports a [`ErrorKind`] via
//! [`EngineError::kind`].

use thiserror::Error;

use crate::ids::BlockId;
use crate::interfaces::StoreError;

/// Cross-cutting error classification shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request or spec failed shape/schema validation.
    ValidationError,
    /// Referenced entity does not exist.
    NotFound,
    /// Uniqueness, lock, or already-published conflict.
    Conflict,
    /// Caller lacks the required role.
    Forbidden,
    /// Caller session missing or invalid.
    Unauthorized,
    /// Rate limit exceeded.
    RateLimited,
    /// Operation exceeded its deadline.
    Timeout,
    /// Block type has no handler on this platform.
    HandlerUnsupported,
    /// Synchronous goto chain exceeded `MAX_GOTO_DEPTH`.
    GotoDepthExceeded,
    /// A goto directive's target block does not exist.
    GotoTargetMissing,
    /// Run exceeded `MAX_RUN_DURATION_MS`.
    RunTimeout,
    /// Run was cancelled.
    Cancelled,
    /// Unclassified internal failure.
    InternalError,
}

impl ErrorKind {
    /// Returns the wire error code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::HandlerUnsupported => "HANDLER_UNSUPPORTED",
            Self::GotoDepthExceeded => "GOTO_DEPTH_EXCEEDED",
            Self::GotoTargetMissing => "GOTO_TARGET_MISSING",
            Self::RunTimeout => "RUN_TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// A block handler's fallible outcome, carrying a machine-readable kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Closed-set kind for this failure.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl HandlerError {
    /// Builds a handler error of the given kind.
    #[must_use]
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// Interpreter and engine-wide execution errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A block's guard conditions could not be evaluated; treated as internal.
    #[error("condition evaluation failed for block {block_id}: {message}")]
    ConditionFailed {
        /// Block whose conditions failed to evaluate.
        block_id: BlockId,
        /// Diagnostic message.
        message: String,
    },
    /// A handler reported failure.
    #[error("block {block_id} failed: {source}")]
    HandlerFailed {
        /// Block whose handler failed.
        block_id: BlockId,
        /// Underlying handler error.
        source: HandlerError,
    },
    /// No handler is registered for a block's type on this platform.
    #[error("no handler registered for block {block_id}")]
    HandlerUnsupported {
        /// Block with the unsupported type.
        block_id: BlockId,
    },
    /// A goto directive referenced a block id absent from the version.
    #[error("goto target missing: {target}")]
    GotoTargetMissing {
        /// The missing target block id.
        target: String,
    },
    /// The synchronous goto chain exceeded `MAX_GOTO_DEPTH`.
    #[error("goto depth exceeded (> {limit})")]
    GotoDepthExceeded {
        /// The configured ceiling that was exceeded.
        limit: u32,
    },
    /// The run exceeded its wall-clock ceiling.
    #[error("run exceeded wall-clock ceiling of {limit_ms}ms")]
    RunTimeout {
        /// The configured ceiling in milliseconds.
        limit_ms: u64,
    },
    /// The run was cancelled.
    #[error("run cancelled")]
    Cancelled,
    /// A resume was attempted against a run that is not awaiting action.
    #[error("run is not awaiting action")]
    NotAwaitingAction,
    /// A resume token did not match the persisted marker.
    #[error("resume marker mismatch")]
    ResumeMarkerMismatch,
    /// The credential store could not resolve the run's secrets.
    #[error("secret resolution failed: {0}")]
    SecretResolutionFailed(String),
    /// The referenced workflow version does not exist.
    #[error("version not found: {workflow_id}@{version}")]
    VersionNotFound {
        /// The workflow the version was requested under.
        workflow_id: String,
        /// The missing version number.
        version: u32,
    },
    /// The persistence layer reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Classifies this error into the cross-cutting [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConditionFailed { .. } | Self::HandlerFailed { .. } => ErrorKind::InternalError,
            Self::HandlerUnsupported { .. } => ErrorKind::HandlerUnsupported,
            Self::GotoTargetMissing { .. } => ErrorKind::GotoTargetMissing,
            Self::GotoDepthExceeded { .. } => ErrorKind::GotoDepthExceeded,
            Self::RunTimeout { .. } => ErrorKind::RunTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NotAwaitingAction | Self::ResumeMarkerMismatch => ErrorKind::Conflict,
            Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::SecretResolutionFailed(_) => ErrorKind::InternalError,
            Self::Store(_) => ErrorKind::InternalError,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn goto_depth_exceeded_maps_to_expected_kind() {
        let err = EngineError::GotoDepthExceeded { limit: 50 };
        assert_eq!(err.kind().code(), "GOTO_DEPTH_EXCEEDED");
    }

    #[test]
    fn handler_unsupported_maps_to_expected_kind() {
        let err = EngineError::HandlerUnsupported { block_id: BlockId::new("b1") };
        assert_eq!(err.kind().code(), "HANDLER_UNSUPPORTED");
    }
}
