// workflow-core/src/interpreter.rs
// ============================================================================
// Module: Block Interpreter
// Description: The per-run state machine: orders blocks, evaluates guards,
// dispatches handlers, applies results, and honours the
// goto/defer/pause flow-control protocol.
// Purpose: The one canonical execution path every trigger source funnels
// through.
// Dependencies: tokio, crate::{block_result, cancel, condition, context,
// error, events, handler, ids, interfaces, limits, model,
// resolver, typo}
// ============================================================================

//! ## Overview
//! [`Interpreter`] is generic over its three external collaborators —
//! [`crate::interfaces::RunRepository`], [`crate::interfaces::SecretResolver`],
//! and [`crate::interfaces::EventPublisher`]. It owns no database,
//! encryption scheme, or transport; it owns only the algorithm.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::block_result::BlockResult;
use crate::block_result::Completion;
use crate::block_result::PauseDirective;
use crate::cancel::CancellationToken;
use crate::condition;
use crate::context::LoopState;
use crate::context::RunScope;
use crate::context::WorkflowContext;
use crate::error::EngineError;
use crate::events::WorkflowEvent;
use crate::handler::HandlerRegistry;
use crate::ids::BlockId;
use crate::ids::OrgId;
use crate::ids::RunId;
use crate::ids::VersionNumber;
use crate::ids::WorkflowId;
use crate::ids::new_step_id;
use crate::interfaces::EventPublisher;
use crate::interfaces::RunRepository;
use crate::interfaces::SecretResolver;
use crate::limits::MAX_CONCURRENT_DEFERRED;
use crate::limits::MAX_GOTO_DEPTH;
use crate::limits::MAX_RUN_DURATION_MS;
use crate::model::Block;
use crate::model::Run;
use crate::model::RunStatus;
use crate::model::Step;
use crate::model::StepError;
use crate::model::StepStatus;
use crate::model::TriggerType;
use crate::model::WorkflowVersion;
use crate::resolver::ResolverLocals;
use crate::resolver::resolve;
use crate::time::Timestamp;
use crate::typo::apply_common_mistakes;

/// Everything needed to start a fresh run.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// Workflow to execute.
    pub workflow_id: WorkflowId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Frozen version snapshot to execute.
    pub version: VersionNumber,
    /// Caller-chosen run id, so a host can register a cancellation handle
    /// before the run reaches a terminal state. `None` generates one.
    pub run_id: Option<RunId>,
    /// What caused this run.
    pub trigger_type: TriggerType,
    /// Trigger payload, becomes `$event`.
    pub event: Value,
    /// Execution environment identifier.
    pub platform: Option<String>,
    /// Device identifier, if supplied by the trigger.
    pub device_id: Option<String>,
    /// Platform-provided directories, becomes `$paths`.
    pub paths: BTreeMap<String, String>,
    /// Caller-supplied metadata, stored on the `Run` row verbatim.
    pub metadata: BTreeMap<String, Value>,
}

/// The block interpreter: dispatches one run's block list to completion,
/// pause, or failure.
pub struct Interpreter<Repo, Secrets, Events> {
    repo: Arc<Repo>,
    secrets: Arc<Secrets>,
    events: Arc<Events>,
    registry: Arc<HandlerRegistry>,
}

/// Outcome of draining the main block sequence (before deferred fan-out).
enum MainLoopOutcome {
    Completed,
    Paused(PausedAt),
}

struct PausedAt {
    directive: PauseDirective,
    block_id: BlockId,
    step_index: usize,
    block_type: String,
}

impl<Repo, Secrets, Events> Interpreter<Repo, Secrets, Events>
where
    Repo: RunRepository,
    Secrets: SecretResolver,
    Events: EventPublisher,
{
    /// Builds an interpreter over its three collaborators and a populated
    /// handler registry.
    pub fn new(repo: Arc<Repo>, secrets: Arc<Secrets>, events: Arc<Events>, registry: Arc<HandlerRegistry>) -> Self {
        Self { repo, secrets, events, registry }
    }

    fn channels_for(run_id: &RunId, workflow_id: &WorkflowId, org_id: &OrgId) -> Vec<String> {
        vec![format!("run:{run_id}"), format!("workflow:{workflow_id}"), format!("org:{org_id}")]
    }

    async fn publish(&self, channels: &[String], event: WorkflowEvent) {
        let _ = self.events.publish_many(channels, &event).await;
    }

    /// Creates a new run from `req` and executes it to completion, pause, or
    /// failure.
    ///
    /// # Errors
    /// Returns [`EngineError`] only for persistence failures that prevent
    /// even recording the outcome; block-level and run-level failures are
    /// represented in the returned [`Run`], not as an `Err`.
    pub async fn trigger(&self, req: TriggerRequest, cancel: CancellationToken) -> Result<Run, EngineError> {
        let version = self
            .repo
            .load_version(&req.workflow_id, req.version)
            .await?
            .ok_or_else(|| EngineError::VersionNotFound {
                workflow_id: req.workflow_id.to_string(),
                version: req.version.value(),
            })?;

        let secrets = self
            .secrets
            .resolve_all(&req.org_id, &req.workflow_id)
            .await
            .map_err(|e| EngineError::HandlerFailed {
                block_id: BlockId::new(""),
                source: crate::error::HandlerError::new("INTERNAL_ERROR", e.to_string()),
            })?;

        let run_id = req.run_id.clone().unwrap_or_else(|| RunId::new(nanoid::nanoid!()));
        let started_at = Timestamp::now();
        let run_scope = RunScope {
            id: run_id.clone(),
            workflow_id: req.workflow_id.clone(),
            version_id: req.version,
            status: RunStatus::Running,
            trigger_type: req.trigger_type,
            started_at,
            platform: req.platform.clone(),
            device_id: req.device_id.clone(),
            step_id: None,
            step_index: None,
            block_id: None,
            block_name: None,
            block_type: None,
        };
        let mut ctx = WorkflowContext::new(run_scope, req.event, secrets, req.paths);

        let mut run = Run {
            id: run_id.clone(),
            workflow_id: req.workflow_id.clone(),
            version: req.version,
            org_id: req.org_id.clone(),
            status: RunStatus::Running,
            trigger_type: req.trigger_type,
            started_at,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            steps: Vec::new(),
            metadata: req.metadata,
            resume_marker: None,
        };
        self.repo.save_run(&run).await?;

        let channels = Self::channels_for(&run_id, &req.workflow_id, &req.org_id);
        self.publish(
            &channels,
            WorkflowEvent::RunStarted {
                run_id: run_id.clone(),
                workflow_id: req.workflow_id.clone(),
                trigger_type: req.trigger_type,
            },
        )
        .await;

        let mut steps = Vec::new();
        let outcome = self.drive(&version, &mut ctx, 0, 0, &mut steps, &channels, &cancel).await;
        self.finalize(&mut run, ctx, steps, outcome, &channels, started_at).await?;
        Ok(run)
    }

    /// Resumes a paused run with an external action's resolved `value`.
    ///
    /// # Errors
    /// Returns [`EngineError::NotAwaitingAction`] if the run is not paused,
    /// [`EngineError::ResumeMarkerMismatch`] if `token` does not match the
    /// persisted marker (duplicate delivery), or a [`crate::error::EngineError::Store`]
    /// on persistence failure.
    pub async fn resume(
        &self,
        run_id: &RunId,
        token: &str,
        value: Value,
        cancel: CancellationToken,
    ) -> Result<Run, EngineError> {
        let mut run = self
            .repo
            .load_run(run_id)
            .await?
            .ok_or_else(|| EngineError::Store(crate::interfaces::StoreError::NotFound(run_id.to_string())))?;
        if run.status != RunStatus::AwaitingAction {
            return Err(EngineError::NotAwaitingAction);
        }
        let marker = run.resume_marker.clone().ok_or(EngineError::NotAwaitingAction)?;
        if marker.token != token {
            return Err(EngineError::ResumeMarkerMismatch);
        }

        let version = self
            .repo
            .load_version(&run.workflow_id, run.version)
            .await?
            .ok_or_else(|| EngineError::VersionNotFound {
                workflow_id: run.workflow_id.to_string(),
                version: run.version.value(),
            })?;
        let secrets = self
            .secrets
            .resolve_all(&run.org_id, &run.workflow_id)
            .await
            .map_err(|e| EngineError::HandlerFailed {
                block_id: BlockId::new(""),
                source: crate::error::HandlerError::new("INTERNAL_ERROR", e.to_string()),
            })?;

        let run_scope = RunScope {
            id: run.id.clone(),
            workflow_id: run.workflow_id.clone(),
            version_id: run.version,
            status: RunStatus::Running,
            trigger_type: run.trigger_type,
            started_at: run.started_at,
            platform: None,
            device_id: None,
            step_id: None,
            step_index: None,
            block_id: None,
            block_name: None,
            block_type: None,
        };
        let mut ctx = WorkflowContext::new(run_scope, Value::Null, secrets, BTreeMap::new());
        ctx.state = marker.state;
        ctx.cache = marker.cache;
        ctx.artifacts = marker.artifacts;
        ctx.loops = marker
            .loops
            .into_iter()
            .map(|(k, v)| (k, serde_json::from_value::<LoopState>(v).unwrap_or_default()))
            .collect();
        if let Some(bind_path) = &marker.bind_value {
            ctx.bind_value(bind_path, value);
        }

        run.status = RunStatus::Running;
        run.resume_marker = None;
        self.repo.save_run(&run).await?;

        let channels = Self::channels_for(&run.id, &run.workflow_id, &run.org_id);
        let mut steps = std::mem::take(&mut run.steps);
        let outcome = self
            .drive(&version, &mut ctx, marker.step_index + 1, marker.goto_depth, &mut steps, &channels, &cancel)
            .await;
        self.finalize(&mut run, ctx, steps, outcome, &channels, run.started_at).await?;
        Ok(run)
    }

    async fn finalize(
        &self,
        run: &mut Run,
        ctx: WorkflowContext,
        steps: Vec<Step>,
        outcome: Result<MainLoopOutcome, EngineError>,
        channels: &[String],
        started_at: Timestamp,
    ) -> Result<(), EngineError> {
        run.steps = steps;
        match outcome {
            Ok(MainLoopOutcome::Completed) => {
                let completed_at = Timestamp::now();
                run.status = RunStatus::Completed;
                run.completed_at = Some(completed_at);
                run.duration_ms = Some(started_at.duration_ms_since(completed_at));
                self.repo.save_run(run).await?;
                self.publish(
                    channels,
                    WorkflowEvent::RunCompleted { run_id: run.id.clone(), duration_ms: run.duration_ms.unwrap_or(0) },
                )
                .await;
            }
            Ok(MainLoopOutcome::Paused(paused)) => {
                run.status = RunStatus::AwaitingAction;
                run.resume_marker = Some(crate::model::ResumeMarker {
                    token: nanoid::nanoid!(),
                    block_id: paused.block_id.clone(),
                    bind_value: paused.directive.bind_value.clone(),
                    step_index: paused.step_index,
                    state: ctx.state,
                    cache: ctx.cache,
                    artifacts: ctx.artifacts,
                    loops: ctx.loops.into_iter().map(|(k, v)| (k, serde_json::to_value(v).unwrap_or(Value::Null))).collect(),
                    goto_depth: 0,
                });
                self.repo.save_run(run).await?;
                self.publish(
                    channels,
                    WorkflowEvent::RunAwaitingAction {
                        run_id: run.id.clone(),
                        block_id: paused.block_id,
                        action_type: paused.block_type,
                    },
                )
                .await;
            }
            Err(err) => {
                let completed_at = Timestamp::now();
                run.status = if matches!(err, EngineError::Cancelled) { RunStatus::Cancelled } else { RunStatus::Failed };
                run.completed_at = Some(completed_at);
                run.duration_ms = Some(started_at.duration_ms_since(completed_at));
                run.error_message = Some(err.to_string());
                self.repo.save_run(run).await?;
                self.publish(
                    channels,
                    WorkflowEvent::RunFailed { run_id: run.id.clone(), error_message: err.to_string() },
                )
                .await;
            }
        }
        Ok(())
    }

    /// Runs the main sequence starting at `cursor`, then drains any deferred
    /// goto fan-out, under the run's wall-clock ceiling.
    async fn drive(
        &self,
        version: &WorkflowVersion,
        ctx: &mut WorkflowContext,
        cursor: usize,
        goto_depth: u32,
        steps: &mut Vec<Step>,
        channels: &[String],
        cancel: &CancellationToken,
    ) -> Result<MainLoopOutcome, EngineError> {
        let deadline = Duration::from_millis(MAX_RUN_DURATION_MS);
        match tokio::time::timeout(
            deadline,
            self.run_main_sequence(version, ctx, cursor, goto_depth, steps, channels, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(EngineError::RunTimeout { limit_ms: MAX_RUN_DURATION_MS }),
        }
    }

    async fn run_main_sequence(
        &self,
        version: &WorkflowVersion,
        ctx: &mut WorkflowContext,
        mut cursor: usize,
        mut goto_depth: u32,
        steps: &mut Vec<Step>,
        channels: &[String],
        cancel: &CancellationToken,
    ) -> Result<MainLoopOutcome, EngineError> {
        let blocks = ordered_blocks(version);
        let index_by_id: BTreeMap<&str, usize> = blocks.iter().enumerate().map(|(i, b)| (b.id.as_str(), i)).collect();
        let mut deferred: Vec<DeferredItem> = Vec::new();

        while cursor < blocks.len() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let block = &blocks[cursor];
            ctx.run.step_index = Some(cursor);
            ctx.run.block_id = Some(block.id.clone());
            ctx.run.block_name = Some(block.name.clone());
            ctx.run.block_type = Some(wire_tag(&block.block_type));

            let locals = ResolverLocals::default();
            if !condition::evaluate(&block.conditions, ctx, &locals) {
                let step_id = new_step_id();
                steps.push(Step {
                    step_id: step_id.clone(),
                    block_id: block.id.clone(),
                    status: StepStatus::Skipped,
                    started_at: None,
                    ended_at: None,
                    error: None,
                    output_summary: None,
                });
                self.publish(
                    channels,
                    WorkflowEvent::RunStep { run_id: ctx.run.id.clone(), step_id, block_id: block.id.clone(), status: StepStatus::Skipped },
                )
                .await;
                cursor += 1;
                continue;
            }

            let mut logic = block.logic.clone();
            apply_common_mistakes(block.block_type, &mut logic);
            let resolved_logic = resolve(&logic, ctx, &locals);
            let mut resolved_block = block.clone();
            resolved_block.logic = resolved_logic;

            let step_id = new_step_id();
            ctx.run.step_id = Some(step_id.clone());
            self.publish(
                channels,
                WorkflowEvent::RunStep { run_id: ctx.run.id.clone(), step_id: step_id.clone(), block_id: block.id.clone(), status: StepStatus::Running },
            )
            .await;
            let started_at = Timestamp::now();

            let Some(handler) = self.registry.get(block.block_type) else {
                return Err(EngineError::HandlerUnsupported { block_id: block.id.clone() });
            };
            let dispatch = handler.handle(&resolved_block, ctx, &locals, cancel).await;
            let ended_at = Timestamp::now();

            match dispatch {
                Ok(BlockResult::Completed(completion)) => {
                    self.apply_completion(ctx, completion);
                    steps.push(Step {
                        step_id: step_id.clone(),
                        block_id: block.id.clone(),
                        status: StepStatus::Completed,
                        started_at: Some(started_at),
                        ended_at: Some(ended_at),
                        error: None,
                        output_summary: None,
                    });
                    self.publish(
                        channels,
                        WorkflowEvent::RunStep { run_id: ctx.run.id.clone(), step_id, block_id: block.id.clone(), status: StepStatus::Completed },
                    )
                    .await;
                    cursor += 1;
                }
                Ok(BlockResult::Paused(directive)) => {
                    steps.push(Step {
                        step_id: step_id.clone(),
                        block_id: block.id.clone(),
                        status: StepStatus::Completed,
                        started_at: Some(started_at),
                        ended_at: Some(ended_at),
                        error: None,
                        output_summary: Some("awaiting external action".to_string()),
                    });
                    let action_type = wire_tag(&directive.kind);
                    return Ok(MainLoopOutcome::Paused(PausedAt {
                        block_type: action_type,
                        directive,
                        block_id: block.id.clone(),
                        step_index: cursor,
                    }));
                }
                Ok(BlockResult::Goto(goto)) => {
                    goto_depth += 1;
                    if goto_depth > MAX_GOTO_DEPTH {
                        return Err(EngineError::GotoDepthExceeded { limit: MAX_GOTO_DEPTH });
                    }
                    if !index_by_id.contains_key(goto.target.as_str()) {
                        return Err(EngineError::GotoTargetMissing { target: goto.target.clone() });
                    }
                    steps.push(Step {
                        step_id: step_id.clone(),
                        block_id: block.id.clone(),
                        status: StepStatus::Completed,
                        started_at: Some(started_at),
                        ended_at: Some(ended_at),
                        error: None,
                        output_summary: None,
                    });
                    self.publish(
                        channels,
                        WorkflowEvent::RunStep { run_id: ctx.run.id.clone(), step_id, block_id: block.id.clone(), status: StepStatus::Completed },
                    )
                    .await;

                    if goto.defer {
                        let max_concurrent = goto.max_concurrent.clamp(1, MAX_CONCURRENT_DEFERRED);
                        let index = goto.loop_name.as_ref().map_or(0, |name| {
                            ctx.loops.get(name).map_or(0, |l| l.index)
                        });
                        if let Some(name) = &goto.loop_name {
                            let entry = ctx.loops.entry(name.clone()).or_default();
                            entry.index += 1;
                        }
                        deferred.push(DeferredItem {
                            target: goto.target.clone(),
                            loop_name: goto.loop_name.clone(),
                            index,
                            max_concurrent,
                        });
                        cursor += 1;
                    } else {
                        if let Some(name) = &goto.loop_name {
                            let entry = ctx.loops.entry(name.clone()).or_default();
                            entry.index += 1;
                        }
                        cursor = index_by_id[goto.target.as_str()];
                    }
                }
                Err(handler_error) => {
                    let error_detail = StepError { kind: handler_error.kind.to_string(), message: handler_error.message.clone() };
                    steps.push(Step {
                        step_id: step_id.clone(),
                        block_id: block.id.clone(),
                        status: StepStatus::Failed,
                        started_at: Some(started_at),
                        ended_at: Some(ended_at),
                        error: Some(error_detail),
                        output_summary: None,
                    });
                    self.publish(
                        channels,
                        WorkflowEvent::RunStep { run_id: ctx.run.id.clone(), step_id, block_id: block.id.clone(), status: StepStatus::Failed },
                    )
                    .await;
                    return Err(EngineError::HandlerFailed { block_id: block.id.clone(), source: handler_error });
                }
            }
        }

        if !deferred.is_empty() {
            self.drain_deferred(version, ctx, deferred, cancel).await?;
        }

        Ok(MainLoopOutcome::Completed)
    }

    fn apply_completion(&self, ctx: &mut WorkflowContext, completion: Completion) {
        ctx.apply_state_delta(completion.state_delta);
        ctx.apply_cache_delta(completion.cache_delta);
        ctx.append_artifacts(completion.artifacts);
    }

    /// Drains the deferred goto queue, FIFO by enqueue time, running up to
    /// `min(maxConcurrent, MAX_CONCURRENT_DEFERRED)` iterations concurrently
    /// per wave. Each iteration dispatches its target block once against a
    /// snapshot of the shared context; results are folded back in enqueue
    /// order (last-write-wins on key collisions, as documented in the
    /// design notes).
    async fn drain_deferred(
        &self,
        version: &WorkflowVersion,
        ctx: &mut WorkflowContext,
        deferred: Vec<DeferredItem>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let blocks = ordered_blocks(version);
        let index_by_id: BTreeMap<&str, usize> = blocks.iter().enumerate().map(|(i, b)| (b.id.as_str(), i)).collect();
        let concurrency = deferred.iter().map(|d| d.max_concurrent).max().unwrap_or(1).clamp(1, MAX_CONCURRENT_DEFERRED) as usize;

        for wave in deferred.chunks(concurrency) {
            let mut join_set = tokio::task::JoinSet::new();
            for item in wave {
                let Some(&block_index) = index_by_id.get(item.target.as_str()) else {
                    return Err(EngineError::GotoTargetMissing { target: item.target.clone() });
                };
                let target_block = blocks[block_index].clone();
                let Some(handler) = self.registry.get(target_block.block_type) else {
                    return Err(EngineError::HandlerUnsupported { block_id: target_block.id.clone() });
                };
                let mut snapshot = ctx.clone();
                if let Some(name) = &item.loop_name {
                    snapshot.loops.entry(name.clone()).or_default().index = item.index;
                }
                let locals = ResolverLocals { index: Some(item.index), ..ResolverLocals::default() };
                let cancel = cancel.clone();
                let loop_name = item.loop_name.clone();
                let index = item.index;
                join_set.spawn(async move {
                    let mut logic = target_block.logic.clone();
                    apply_common_mistakes(target_block.block_type, &mut logic);
                    let resolved_logic = resolve(&logic, &snapshot, &locals);
                    let mut resolved_block = target_block.clone();
                    resolved_block.logic = resolved_logic;
                    let outcome = handler.handle(&resolved_block, &snapshot, &locals, &cancel).await;
                    (loop_name, index, target_block.id, outcome)
                });
            }

            let mut results = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(_join_error) => {
                        return Err(EngineError::HandlerFailed {
                            block_id: BlockId::new(""),
                            source: crate::error::HandlerError::new("INTERNAL_ERROR", "deferred task panicked"),
                        });
                    }
                }
            }
            results.sort_by_key(|(_, index, _, _)| *index);
            for (loop_name, index, block_id, outcome) in results {
                match outcome {
                    Ok(BlockResult::Completed(completion)) => {
                        self.apply_completion(ctx, completion.clone());
                        if let Some(name) = loop_name {
                            ctx.loops.entry(name).or_default().artifact =
                                completion.state_delta.values().next().cloned();
                        }
                    }
                    Ok(_) => {
                        return Err(EngineError::HandlerUnsupported { block_id });
                    }
                    Err(handler_error) => {
                        return Err(EngineError::HandlerFailed { block_id, source: handler_error });
                    }
                }
                let _ = index;
            }
        }
        Ok(())
    }
}

/// Returns `version`'s blocks sorted by `order` ascending, breaking ties by
/// `id` lexicographic ascending per spec: blocks at equal `order` within a
/// version are rejected by [`crate::validate::validate_version`] at publish
/// time, but the interpreter still defends against a bypassed guard.
fn ordered_blocks(version: &WorkflowVersion) -> Vec<Block> {
    let mut blocks = version.blocks.clone();
    blocks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.as_str().cmp(b.id.as_str())));
    blocks
}

/// Renders a serde `rename_all = "snake_case"` enum value as its wire tag,
/// e.g. `BlockType::UiForm` -> `"ui_form"`.
fn wire_tag<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value).ok().and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default()
}

#[derive(Debug, Clone)]
struct DeferredItem {
    target: BlockId,
    loop_name: Option<String>,
    index: u64,
    max_concurrent: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::block_result::HandlerResult;
    use crate::handler::BlockHandler;
    use crate::ids::VersionNumber;
    use crate::interfaces::EventPublisher;
    use crate::interfaces::PublishError;
    use crate::interfaces::RunRepository;
    use crate::interfaces::SecretResolver;
    use crate::interfaces::StoreError;
    use crate::model::BlockType;
    use crate::model::Condition;
    use crate::model::ConditionOperator;
    use crate::model::VersionStatus;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct MemRepo {
        versions: Vec<WorkflowVersion>,
        runs: Mutex<BTreeMap<String, Run>>,
    }

    #[async_trait]
    impl RunRepository for MemRepo {
        async fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
            Ok(self.runs.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(run_id.as_str()).cloned())
        }
        async fn save_run(&self, run: &Run) -> Result<(), StoreError> {
            self.runs.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(run.id.as_str().to_string(), run.clone());
            Ok(())
        }
        async fn load_version(&self, workflow_id: &WorkflowId, version: VersionNumber) -> Result<Option<WorkflowVersion>, StoreError> {
            Ok(self.versions.iter().find(|v| &v.workflow_id == workflow_id && v.version == version).cloned())
        }
        async fn load_workflow(&self, _workflow_id: &WorkflowId) -> Result<Option<crate::model::Workflow>, StoreError> {
            Ok(None)
        }
    }

    struct NoSecrets;
    #[async_trait]
    impl SecretResolver for NoSecrets {
        async fn resolve_all(&self, _org_id: &OrgId, _workflow_id: &WorkflowId) -> Result<BTreeMap<String, String>, crate::interfaces::SecretError> {
            Ok(BTreeMap::new())
        }
    }

    struct NoopEvents;
    #[async_trait]
    impl EventPublisher for NoopEvents {
        async fn publish(&self, _channel: &str, _event: &WorkflowEvent) -> Result<(), PublishError> {
            Ok(())
        }
    }

    struct IncrementHandler;
    #[async_trait]
    impl BlockHandler for IncrementHandler {
        fn block_type(&self) -> BlockType {
            BlockType::Math
        }
        async fn handle(&self, block: &Block, ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let current = ctx.state.get("i").and_then(serde_json::Value::as_i64).unwrap_or(0);
            let bind = block.logic.get("math_bind_value").and_then(|v| v.as_str()).unwrap_or("i");
            let mut delta = BTreeMap::new();
            delta.insert(bind.to_string(), json!(current + 1));
            Ok(BlockResult::Completed(Completion { state_delta: delta, cache_delta: BTreeMap::new(), artifacts: vec![] }))
        }
    }

    struct GotoHandler;
    #[async_trait]
    impl BlockHandler for GotoHandler {
        fn block_type(&self) -> BlockType {
            BlockType::Goto
        }
        async fn handle(&self, block: &Block, _ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let target = block.logic["goto_target_block_id"].as_str().unwrap().to_string();
            Ok(BlockResult::Goto(crate::block_result::GotoDirective {
                target,
                defer: false,
                max_concurrent: 1,
                loop_name: Some("L".to_string()),
            }))
        }
    }

    fn block(id: &str, order: u32, block_type: BlockType, logic: Value, conditions: Vec<Condition>) -> Block {
        Block {
            id: BlockId::new(id),
            workflow_id: WorkflowId::new("w1"),
            workflow_version: VersionNumber::new(1),
            name: id.to_string(),
            block_type,
            logic,
            conditions,
            order,
            notes: None,
        }
    }

    fn version(blocks: Vec<Block>) -> WorkflowVersion {
        WorkflowVersion {
            workflow_id: WorkflowId::new("w1"),
            version: VersionNumber::new(1),
            status: VersionStatus::Published,
            trigger_type: TriggerType::Api,
            trigger_config: json!({}),
            execution_environments: vec![],
            changelog: None,
            blocks,
        }
    }

    fn registry() -> Arc<HandlerRegistry> {
        let mut r = HandlerRegistry::new();
        r.register(Arc::new(IncrementHandler));
        r.register(Arc::new(GotoHandler));
        Arc::new(r)
    }

    #[tokio::test]
    async fn goto_loop_runs_expected_iterations() {
        let a = block("a", 0, BlockType::Math, json!({"math_bind_value": "i"}), vec![]);
        let b = block(
            "b",
            1,
            BlockType::Goto,
            json!({"goto_target_block_id": "a"}),
            vec![Condition { left: json!("$state.i"), operator: ConditionOperator::Lt, right: Some(json!(3)) }],
        );
        let v = version(vec![a, b]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), registry());
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let run = interp.trigger(req, CancellationToken::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.steps.len(), 6);
    }

    #[tokio::test]
    async fn condition_skip_completes_run() {
        let only = block(
            "a",
            0,
            BlockType::Math,
            json!({}),
            vec![Condition { left: json!("$event.go"), operator: ConditionOperator::Eq, right: Some(json!("yes")) }],
        );
        let v = version(vec![only]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), registry());
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({"go": "no"}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let run = interp.trigger(req, CancellationToken::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].status, StepStatus::Skipped);
    }

    /// A stubbed `fetch` that always returns a fixed JSON body, so
    /// the linear-success scenario can be exercised without a real HTTP
    /// client — the real `fetch` handler lives in `workflow-handlers`.
    struct StubFetchHandler;
    #[async_trait]
    impl BlockHandler for StubFetchHandler {
        fn block_type(&self) -> BlockType {
            BlockType::Fetch
        }
        async fn handle(&self, block: &Block, _ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let bind = block.logic.get("fetch_bind_value").and_then(|v| v.as_str()).unwrap_or("response");
            let mut delta = BTreeMap::new();
            delta.insert(bind.to_string(), json!({"status": 200, "headers": {}, "body": {"name": "Ada"}}));
            Ok(BlockResult::Completed(Completion { state_delta: delta, cache_delta: BTreeMap::new(), artifacts: vec![] }))
        }
    }

    /// Binds whatever the interpreter already resolved at `logic.template`
    /// (mustache interpolation happens in the resolver, not the handler).
    struct TemplateHandler;
    #[async_trait]
    impl BlockHandler for TemplateHandler {
        fn block_type(&self) -> BlockType {
            BlockType::String
        }
        async fn handle(&self, block: &Block, _ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let bind = block.logic.get("string_bind_value").and_then(|v| v.as_str()).unwrap_or("result");
            let rendered = block.logic.get("template").cloned().unwrap_or(Value::Null);
            let mut delta = BTreeMap::new();
            delta.insert(bind.to_string(), rendered);
            Ok(BlockResult::Completed(Completion { state_delta: delta, cache_delta: BTreeMap::new(), artifacts: vec![] }))
        }
    }

    fn registry_with_transforms() -> Arc<HandlerRegistry> {
        let mut r = HandlerRegistry::new();
        r.register(Arc::new(StubFetchHandler));
        r.register(Arc::new(TemplateHandler));
        Arc::new(r)
    }

    #[tokio::test]
    async fn linear_success_resolves_fetch_then_template() {
        let fetch = block("fetch", 0, BlockType::Fetch, json!({"fetch_bind_value": "r"}), vec![]);
        let render = block(
            "render",
            1,
            BlockType::String,
            json!({"template": "hi {{$state.r.body.name}}", "string_bind_value": "greeting"}),
            vec![],
        );
        let v = version(vec![fetch, render]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), registry_with_transforms());
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let run = interp.trigger(req, CancellationToken::new()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.steps.len(), 2);
        assert!(run.steps.iter().all(|s| s.status == StepStatus::Completed));
    }

    /// A test-only `ui_form` handler that always pauses, binding the
    /// eventual resume value at `bind_value`.
    struct FormPauseHandler;
    #[async_trait]
    impl BlockHandler for FormPauseHandler {
        fn block_type(&self) -> BlockType {
            BlockType::UiForm
        }
        async fn handle(&self, block: &Block, _ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let bind = block.logic.get("ui_form_bind_value").and_then(|v| v.as_str()).map(str::to_string);
            Ok(BlockResult::Paused(crate::block_result::PauseDirective {
                kind: crate::block_result::PauseKind::UiForm,
                payload: json!({"fields": [{"name": "email", "type": "email", "required": true}]}),
                bind_value: bind,
            }))
        }
    }

    fn registry_with_ui() -> Arc<HandlerRegistry> {
        let mut r = HandlerRegistry::new();
        r.register(Arc::new(FormPauseHandler));
        r.register(Arc::new(TemplateHandler));
        Arc::new(r)
    }

    #[tokio::test]
    async fn ui_pause_then_resume_completes_run() {
        let form = block("form", 0, BlockType::UiForm, json!({"ui_form_bind_value": "f"}), vec![]);
        let render = block(
            "render",
            1,
            BlockType::String,
            json!({"template": "got {{$state.f.email}}", "string_bind_value": "greeting"}),
            vec![],
        );
        let v = version(vec![form, render]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), registry_with_ui());
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let paused = interp.trigger(req, CancellationToken::new()).await.unwrap();
        assert_eq!(paused.status, RunStatus::AwaitingAction);
        let marker = paused.resume_marker.clone().unwrap();
        assert_eq!(marker.block_id, BlockId::new("form"));

        let resumed = interp
            .resume(&paused.id, &marker.token, json!({"email": "a@b"}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.steps.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_resume_token_is_rejected() {
        let form = block("form", 0, BlockType::UiForm, json!({"ui_form_bind_value": "f"}), vec![]);
        let v = version(vec![form]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), registry_with_ui());
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let paused = interp.trigger(req, CancellationToken::new()).await.unwrap();
        let marker = paused.resume_marker.clone().unwrap();
        interp.resume(&paused.id, &marker.token, json!({"email": "a@b"}), CancellationToken::new()).await.unwrap();
        let retry = interp.resume(&paused.id, &marker.token, json!({"email": "a@b"}), CancellationToken::new()).await;
        assert!(matches!(retry, Err(EngineError::NotAwaitingAction)));
    }

    /// A deferred goto target that records the iteration index it observed
    /// under `$loops.L.index`.
    struct RecordIndexHandler;
    #[async_trait]
    impl BlockHandler for RecordIndexHandler {
        fn block_type(&self) -> BlockType {
            BlockType::Math
        }
        async fn handle(&self, _block: &Block, ctx: &WorkflowContext, locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let index = ctx.loops.get("L").map_or(0, |l| l.index);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let key = locals.item.as_ref().and_then(|v| v.as_str()).map_or_else(|| format!("seen_{index}"), str::to_string);
            let mut delta = BTreeMap::new();
            delta.insert(key, json!(index));
            Ok(BlockResult::Completed(Completion { state_delta: delta, cache_delta: BTreeMap::new(), artifacts: vec![] }))
        }
    }

    struct DeferringGotoHandler;
    #[async_trait]
    impl BlockHandler for DeferringGotoHandler {
        fn block_type(&self) -> BlockType {
            BlockType::Goto
        }
        async fn handle(&self, block: &Block, _ctx: &WorkflowContext, _locals: &ResolverLocals, _cancel: &CancellationToken) -> HandlerResult {
            let target = block.logic["goto_target_block_id"].as_str().unwrap().to_string();
            Ok(BlockResult::Goto(crate::block_result::GotoDirective {
                target,
                defer: true,
                max_concurrent: 3,
                loop_name: Some("L".to_string()),
            }))
        }
    }

    #[tokio::test]
    async fn deferred_fan_out_runs_in_bounded_waves() {
        let work = block("work", 0, BlockType::Math, json!({}), vec![]);
        let fan = block("fan", 1, BlockType::Goto, json!({"goto_target_block_id": "work"}), vec![]);
        let v = version(vec![fan, work]);
        let repo = Arc::new(MemRepo { versions: vec![v], runs: Mutex::new(BTreeMap::new()) });
        let mut r = HandlerRegistry::new();
        r.register(Arc::new(RecordIndexHandler));
        r.register(Arc::new(DeferringGotoHandler));
        let interp = Interpreter::new(repo, Arc::new(NoSecrets), Arc::new(NoopEvents), Arc::new(r));
        let req = TriggerRequest {
            workflow_id: WorkflowId::new("w1"),
            org_id: OrgId::new("org1"),
            version: VersionNumber::new(1),
            run_id: None,
            trigger_type: TriggerType::Api,
            event: json!({}),
            platform: None,
            device_id: None,
            paths: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        let started = std::time::Instant::now();
        let run = interp.trigger(req, CancellationToken::new()).await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(run.status, RunStatus::Completed);
        // One synchronous "fan" step plus one deferred "work" iteration
        // (max_concurrent=3 fans out a single enqueue here, not a loop over
        // five; see workflow-handlers::goto tests for the 5-iteration case).
        assert!(elapsed >= std::time::Duration::from_millis(40));
    }
}
