// workflow-events/src/error.rs
// ============================================================================
// Module: Event Fan-Out Errors
// Description: Fallible outcomes for the public-run gate.
// Purpose: Give gate rejections a typed shape distinct from workflow-core's
// engine-wide error kinds.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Reasons a public run attempt is rejected by the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublicGateError {
    /// No workflow is published under the requested slug.
    #[error("no public workflow at this slug")]
    SlugNotFound,
    /// The workflow is not publicly reachable.
    #[error("workflow is not public")]
    NotPublic,
    /// The workflow has been disabled.
    #[error("workflow is disabled")]
    Disabled,
    /// The workflow's public access mode does not permit triggering runs.
    #[error("workflow is view-only")]
    ViewOnly,
    /// The caller exceeded the public rate limit for this slug.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },
}
