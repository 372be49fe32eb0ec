// workflow-server/src/handlers/public.rs
// ============================================================================
// Module: Public-Run Handler
// Description: `POST /public/:slug/runs`, the anonymous trigger surface.
// Purpose: Gate an unauthenticated trigger through workflow-events's
// PublicRunGate before handing it to the same engine authenticated
// triggers use.
// Dependencies: axum, workflow-core, workflow-events
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::ConnectInfo;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;
use workflow_core::CancellationToken;
use workflow_core::audit::AuditEvent;
use workflow_core::ids::RunId;
use workflow_core::model::TriggerType;
use workflow_events::PublicRunGate;

use crate::error::ApiError;
use crate::error::Envelope;
use crate::state::AppState;

/// Reads the caller's IP, preferring a well-formed `X-Forwarded-For` first
/// hop over the raw socket address — a server fronted by a reverse proxy
/// otherwise hashes the proxy's own address for every caller.
fn client_ip(headers: &HeaderMap, connect_info: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| connect_info.ip().to_string(), ToString::to_string)
}

/// `POST /public/:slug/runs` — anonymous, rate-limited, gated trigger.
pub async fn trigger_public(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(event): Json<Value>,
) -> Result<Envelope<workflow_core::model::Run>, ApiError> {
    let workflow = state
        .repo
        .find_workflow_by_slug(&slug)
        .await
        .map_err(|err| ApiError::new(crate::error::ApiErrorCode::InternalError, err.to_string()))?
        .ok_or_else(|| ApiError::not_found("no public workflow at this slug"))?;

    let ip = client_ip(&headers, connect_info);
    let user_agent =
        headers.get(axum::http::header::USER_AGENT).and_then(|value| value.to_str().ok()).map(str::to_string);

    let gate = PublicRunGate::new(&state.public_rate_limiter);
    let public_run = gate.check(&workflow, &ip, user_agent).await?;
    state.audit.record(
        &AuditEvent::now("public_run.created")
            .with_org(workflow.org_id.as_str())
            .with_workflow(workflow.id.as_str())
            .with_detail(format!("ip_hash={} anonymous={}", public_run.ip_hash, public_run.is_anonymous)),
    );

    if workflow.active_version.is_unpublished {
        return Err(ApiError::new(crate::error::ApiErrorCode::Unprocessable, "workflow has no published version"));
    }

    let run_id = RunId::new(nanoid::nanoid!());
    let token = CancellationToken::new();
    state.register_cancellation(run_id.clone(), token.clone()).await;

    let request = workflow_core::TriggerRequest {
        workflow_id: workflow.id.clone(),
        org_id: workflow.org_id.clone(),
        version: workflow.active_version,
        run_id: Some(run_id.clone()),
        trigger_type: TriggerType::Api,
        event,
        platform: Some("server".to_string()),
        device_id: None,
        paths: BTreeMap::new(),
        metadata: BTreeMap::new(),
    };

    let result = state.engine.trigger(request, token).await;
    state.clear_cancellation(&run_id).await;
    let run = result?;
    Ok(Envelope::ok(run))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn prefers_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        let socket: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, socket), "203.0.113.9");
    }

    #[test]
    fn falls_back_to_socket_address_without_header() {
        let headers = HeaderMap::new();
        let socket: SocketAddr = "198.51.100.7:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, socket), "198.51.100.7");
    }
}
