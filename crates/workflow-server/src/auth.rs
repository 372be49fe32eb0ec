// workflow-server/src/auth.rs
// ============================================================================
// Module: Auth Context Extractor
// Description: A minimal stand-in for an identity/SSO middleware layer,
//              named as an out-of-scope external collaborator.
// Purpose: Give authenticated handlers an `OrgId` without pulling in a real
// session/SSO layer this crate's scope explicitly excludes.
// Dependencies: axum, workflow-core::ids
// ============================================================================

//! ## Overview
//! Identity/SSO and role enforcement are expected to be handled by a
//! middleware layer that pre-populates an auth context in front of this
//! server — that layer is out of scope here. This crate's own stand-in
//! reads `X-Org-Id` (the org the caller is scoped to) and requires a
//! non-empty `Authorization: Bearer <token>` header, failing closed with
//! `UNAUTHORIZED` when either is missing. It does not validate the token
//! against anything; a production deployment replaces this extractor, not
//! the handlers that consume it.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use workflow_core::ids::OrgId;

use crate::error::ApiError;
use crate::error::ApiErrorCode;

/// The authenticated caller's organization scope.
pub struct AuthContext {
    /// The organization this request is scoped to.
    pub org_id: OrgId,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !auth_header.starts_with("Bearer ") || auth_header.len() <= "Bearer ".len() {
            return Err(ApiError::new(ApiErrorCode::Unauthorized, "missing or malformed Authorization header"));
        }
        let org_id = parts
            .headers
            .get("x-org-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ApiError::new(ApiErrorCode::Unauthorized, "missing X-Org-Id header"))?;
        Ok(Self { org_id: OrgId::new(org_id) })
    }
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiErrorCode::BadRequest
        } else {
            ApiErrorCode::InternalError
        };
        Self::new(code, status.canonical_reason().unwrap_or("request rejected").to_string())
    }
}
