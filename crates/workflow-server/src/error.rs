// workflow-server/src/error.rs
// ============================================================================
// Module: HTTP Error Envelope
// Description: Maps engine/store/credential/config errors onto the
// `{data, error, meta}` response envelope and HTTP status table.
// Purpose: Give every handler a single `?`-compatible error type instead of
// hand-rolling a response per failure site.
// Dependencies: axum, serde_json, workflow-core::error, workflow-credentials,
// workflow-events
// ============================================================================

//! ## Overview
//! `workflow_core::error::ErrorKind` classifies engine failures but has no
//! variant for a malformed request body or an unresolvable route parameter —
//! those never reach the engine. `ApiError` widens the closed set with two
//! request-shape-only codes (`BAD_REQUEST`, `UNPROCESSABLE`) so the server's
//! error code table matches exactly while the engine's own `ErrorKind`
//! stays untouched. See DESIGN.md for the reconciliation note.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use serde_json::Value;
use workflow_core::error::EngineError;
use workflow_core::error::ErrorKind;
use workflow_credentials::CredentialError;
use workflow_events::PublicGateError;

use crate::config::ConfigError;

/// A single server-side error code, widening `ErrorKind` with the two
/// request-shape codes the engine never produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// The request body or query string could not be parsed.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Authenticated but not permitted.
    Forbidden,
    /// No resource at the given id.
    NotFound,
    /// The request conflicts with the resource's current state.
    Conflict,
    /// The request is well-formed but semantically invalid.
    Unprocessable,
    /// Caller exceeded a rate limit.
    RateLimited,
    /// An operation exceeded its time budget.
    Timeout,
    /// Field-level validation failure.
    ValidationError,
    /// Unclassified server-side failure.
    InternalError,
}

impl ApiErrorCode {
    /// The wire error code string table.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unprocessable => "UNPROCESSABLE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status this code maps to.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorKind> for ApiErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ValidationError => Self::ValidationError,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::Forbidden => Self::Forbidden,
            ErrorKind::Unauthorized => Self::Unauthorized,
            ErrorKind::RateLimited => Self::RateLimited,
            ErrorKind::Timeout
            | ErrorKind::RunTimeout
            | ErrorKind::GotoDepthExceeded
            | ErrorKind::GotoTargetMissing
            | ErrorKind::HandlerUnsupported
            | ErrorKind::Cancelled => Self::Unprocessable,
            ErrorKind::InternalError => Self::InternalError,
        }
    }
}

/// A server-facing error, ready to render as an envelope response.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// The wire error code and HTTP status.
    pub code: ApiErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional field-keyed detail payload (used for `VALIDATION_ERROR`).
    pub details: Option<Value>,
    /// Present only for `RATE_LIMITED`; drives the `Retry-After` header.
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Builds an `ApiError` with no details and no retry-after hint.
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None, retry_after_secs: None }
    }

    /// Builds a `BAD_REQUEST` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    /// Builds a `NOT_FOUND` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    /// Attaches field-keyed validation details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches a `Retry-After` hint (seconds).
    #[must_use]
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = ApiErrorCode::from(err.kind());
        Self::new(code, err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        let code = match &err {
            CredentialError::NotFound(_) => ApiErrorCode::NotFound,
            CredentialError::AlreadyExists { .. } => ApiErrorCode::Conflict,
            CredentialError::Io(_) | CredentialError::Crypto(_) => ApiErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<PublicGateError> for ApiError {
    fn from(err: PublicGateError) -> Self {
        match err {
            PublicGateError::SlugNotFound => Self::new(ApiErrorCode::NotFound, "no public workflow at this slug"),
            PublicGateError::NotPublic | PublicGateError::Disabled => {
                Self::new(ApiErrorCode::Forbidden, err.to_string())
            }
            PublicGateError::ViewOnly => Self::new(ApiErrorCode::Forbidden, "workflow is view-only"),
            PublicGateError::RateLimited { retry_after_secs } => {
                Self::new(ApiErrorCode::RateLimited, "rate limit exceeded").with_retry_after(retry_after_secs)
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::new(ApiErrorCode::InternalError, err.to_string())
    }
}

/// The envelope's `error` field shape.
#[derive(Debug, Serialize)]
struct EnvelopeError {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// The full `{data, error, meta}` response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    data: Option<T>,
    error: Option<EnvelopeError>,
    meta: Option<Value>,
}

impl<T> Envelope<T> {
    /// Wraps a successful payload with no pagination metadata.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self { data: Some(data), error: None, meta: None }
    }

    /// Wraps a successful payload with pagination metadata.
    #[must_use]
    pub const fn ok_with_meta(data: T, meta: Value) -> Self {
        Self { data: Some(data), error: None, meta: Some(meta) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let envelope: Envelope<()> = Envelope {
            data: None,
            error: Some(EnvelopeError { code: self.code.code(), message: self.message, details: self.details }),
            meta: None,
        };
        let mut response = (status, Json(envelope)).into_response();
        if let Some(retry_after) = self.retry_after_secs {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        assert_eq!(ApiErrorCode::from(ErrorKind::ValidationError).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        assert_eq!(ApiErrorCode::from(ErrorKind::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn not_awaiting_action_maps_to_conflict() {
        let err = EngineError::NotAwaitingAction;
        let api_err = ApiError::from(err);
        assert_eq!(api_err.code.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn public_gate_rate_limited_carries_retry_after() {
        let err = PublicGateError::RateLimited { retry_after_secs: 7 };
        let api_err = ApiError::from(err);
        assert_eq!(api_err.retry_after_secs, Some(7));
        assert_eq!(api_err.code.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
