// workflow-server/src/handlers/runs.rs
// ============================================================================
// Module: Run-Facing Handlers
// Description: Trigger, status, list, action-submit, and cancel endpoints.
// Purpose: Implement the authenticated run-facing surface over the wired
// `Engine`.
// Dependencies: axum, workflow-core, workflow-store-sqlite
// ============================================================================

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use workflow_core::CancellationToken;
use workflow_core::ids::RunId;
use workflow_core::ids::WorkflowId;
use workflow_core::interfaces::RunRepository;
use workflow_core::model::RunStatus;
use workflow_core::model::TriggerType;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::error::ApiErrorCode;
use crate::error::Envelope;
use crate::pagination;
use crate::state::AppState;

/// Looks up a workflow and fails with `NOT_FOUND`/`FORBIDDEN` as appropriate
/// for the authenticated caller's org scope.
async fn load_owned_workflow(
    state: &AppState,
    workflow_id: &WorkflowId,
    auth: &AuthContext,
) -> Result<workflow_core::model::Workflow, ApiError> {
    let workflow = state
        .repo
        .load_workflow(workflow_id)
        .await
        .map_err(|err| ApiError::new(ApiErrorCode::InternalError, err.to_string()))?
        .ok_or_else(|| ApiError::not_found("no workflow with this id"))?;
    if workflow.org_id != auth.org_id {
        return Err(ApiError::new(ApiErrorCode::Forbidden, "workflow does not belong to this organization"));
    }
    Ok(workflow)
}

/// `POST /workflows/:id/runs` — triggers a run under the caller's org.
pub async fn trigger(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(workflow_id): Path<String>,
    Query(query): Query<TriggerQuery>,
    Json(event): Json<Value>,
) -> Result<Envelope<workflow_core::model::Run>, ApiError> {
    let workflow_id = WorkflowId::new(workflow_id);
    let workflow = load_owned_workflow(&state, &workflow_id, &auth).await?;
    if workflow.is_disabled {
        return Err(ApiError::new(ApiErrorCode::Forbidden, "workflow is disabled"));
    }
    if workflow.active_version.is_unpublished {
        return Err(ApiError::new(ApiErrorCode::Unprocessable, "workflow has no published version"));
    }

    let decision = state.internal_rate_limiter.check(auth.org_id.as_str(), "trigger").await;
    if let workflow_events::RateLimitDecision::Limited { retry_after_secs } = decision {
        return Err(ApiError::new(ApiErrorCode::RateLimited, "rate limit exceeded").with_retry_after(retry_after_secs));
    }

    let run_id = RunId::new(nanoid::nanoid!());
    let token = CancellationToken::new();
    state.register_cancellation(run_id.clone(), token.clone()).await;

    let request = workflow_core::TriggerRequest {
        workflow_id: workflow.id.clone(),
        org_id: auth.org_id,
        version: workflow.active_version,
        run_id: Some(run_id.clone()),
        trigger_type: TriggerType::Api,
        event,
        platform: query.platform,
        device_id: query.device_id,
        paths: BTreeMap::new(),
        metadata: BTreeMap::new(),
    };

    let result = state.engine.trigger(request, token).await;
    state.clear_cancellation(&run_id).await;
    let run = result?;
    Ok(Envelope::ok(run))
}

/// Optional platform/device hints forwarded into the trigger request.
#[derive(Debug, Deserialize, Default)]
pub struct TriggerQuery {
    /// Execution platform, used to pick the handler registry variant.
    pub platform: Option<String>,
    /// Originating device id, if any.
    pub device_id: Option<String>,
}

/// `GET /runs/:id` — fetches a single run by id.
pub async fn get_run(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(run_id): Path<String>,
) -> Result<Envelope<workflow_core::model::Run>, ApiError> {
    let run_id = RunId::new(run_id);
    let run = state
        .repo
        .load_run(&run_id)
        .await
        .map_err(|err| ApiError::new(ApiErrorCode::InternalError, err.to_string()))?
        .ok_or_else(|| ApiError::not_found("no run with this id"))?;
    if run.org_id != auth.org_id {
        return Err(ApiError::new(ApiErrorCode::Forbidden, "run does not belong to this organization"));
    }
    Ok(Envelope::ok(run))
}

/// Query parameters for `GET /runs`.
#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// The workflow whose runs are listed (required: the store indexes runs
    /// by workflow, not globally).
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Requested page size, clamped to `[1, 250]`.
    pub limit: Option<usize>,
}

/// `GET /runs` — cursor-paginated list of runs for one workflow.
pub async fn list_runs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListRunsQuery>,
) -> Result<Envelope<Vec<workflow_core::model::Run>>, ApiError> {
    let workflow_id = WorkflowId::new(query.workflow_id);
    load_owned_workflow(&state, &workflow_id, &auth).await?;

    let cursor = query.cursor.as_deref().map(pagination::decode_cursor).transpose()?;
    let limit = pagination::clamp_limit(query.limit);
    let all_runs = state
        .repo
        .list_runs(&workflow_id)
        .await
        .map_err(|err| ApiError::new(ApiErrorCode::InternalError, err.to_string()))?;
    let page = pagination::paginate(&all_runs, cursor.as_ref(), limit);
    let meta = json!({ "pageSize": limit, "cursor": page.next_cursor });
    Ok(Envelope::ok_with_meta(page.items, meta))
}

/// Body for `POST /runs/:id/actions`.
#[derive(Debug, Deserialize)]
pub struct SubmitActionRequest {
    /// The paused block's id, if the client wants the server to check it
    /// matches the persisted resume marker before resuming.
    #[serde(rename = "blockId")]
    pub block_id: Option<String>,
    /// The resolved value written at the paused block's `bind_value`.
    pub value: Value,
}

/// `POST /runs/:id/actions` — submits a UI-pause response and resumes.
pub async fn submit_action(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(run_id): Path<String>,
    Json(body): Json<SubmitActionRequest>,
) -> Result<Envelope<workflow_core::model::Run>, ApiError> {
    let run_id = RunId::new(run_id);
    let run = state
        .repo
        .load_run(&run_id)
        .await
        .map_err(|err| ApiError::new(ApiErrorCode::InternalError, err.to_string()))?
        .ok_or_else(|| ApiError::not_found("no run with this id"))?;
    if run.org_id != auth.org_id {
        return Err(ApiError::new(ApiErrorCode::Forbidden, "run does not belong to this organization"));
    }
    if run.status != RunStatus::AwaitingAction {
        return Err(ApiError::new(ApiErrorCode::Conflict, "run is not awaiting an action"));
    }
    let marker = run
        .resume_marker
        .clone()
        .ok_or_else(|| ApiError::new(ApiErrorCode::Conflict, "run has no resume marker"))?;
    if let Some(expected) = &body.block_id
        && expected.as_str() != marker.block_id.as_str()
    {
        return Err(ApiError::new(ApiErrorCode::Conflict, "blockId does not match the paused block"));
    }

    let token = CancellationToken::new();
    state.register_cancellation(run_id.clone(), token.clone()).await;
    let result = state.engine.resume(&run_id, &marker.token, body.value, token).await;
    state.clear_cancellation(&run_id).await;
    let run = result?;
    Ok(Envelope::ok(run))
}

/// `POST /runs/:id/cancel` — cancels an in-process run.
pub async fn cancel_run(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(run_id): Path<String>,
) -> Result<Envelope<Value>, ApiError> {
    let run_id_typed = RunId::new(run_id);
    let run = state
        .repo
        .load_run(&run_id_typed)
        .await
        .map_err(|err| ApiError::new(ApiErrorCode::InternalError, err.to_string()))?
        .ok_or_else(|| ApiError::not_found("no run with this id"))?;
    if run.org_id != auth.org_id {
        return Err(ApiError::new(ApiErrorCode::Forbidden, "run does not belong to this organization"));
    }
    if run.status.is_terminal() {
        return Err(ApiError::new(ApiErrorCode::Conflict, "run has already finished"));
    }
    let cancelled = state.cancel_run(&run_id_typed).await;
    if !cancelled {
        return Err(ApiError::new(
            ApiErrorCode::Conflict,
            "run is not executing in this process (already paused, or owned elsewhere)",
        ));
    }
    Ok(Envelope::ok(json!({ "cancelling": true })))
}
