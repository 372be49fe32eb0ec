// workflow-core/src/model.rs
// ============================================================================
// Module: Workflow Engine Data Model
// Description: Canonical workflow, version, block, run, step, and artifact types.
// Purpose: Provide stable, serializable types shared by every component.
// Dependencies: serde, serde_json, crate::{ids, time}
// ============================================================================

//! ## Overview
//! These types mirror the persisted schema. The engine never owns the
//! relational schema itself — see [`crate::interfaces`] for the repository
//! contracts a host application must implement — but it does own the shape
//! every repository implementation must produce.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ids::ArtifactId;
use crate::ids::BlockId;
use crate::ids::OrgId;
use crate::ids::RunId;
use crate::ids::StepId;
use crate::ids::VersionNumber;
use crate::ids::WorkflowId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Workflow
// ============================================================================

/// Access mode for a publicly reachable workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicAccessMode {
    /// Visitors may view the workflow definition but not trigger runs.
    View,
    /// Visitors may trigger runs through the public endpoint.
    Run,
}

/// Branding applied to the public-facing run surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicBranding {
    /// Display name shown to anonymous visitors.
    pub display_name: Option<String>,
    /// Logo URL shown to anonymous visitors.
    pub logo_url: Option<String>,
    /// Accent color (hex) for the public page.
    pub accent_color: Option<String>,
}

/// Per-workflow override of the public rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRateLimit {
    /// Maximum public run requests per minute for this workflow.
    pub max_per_minute: u32,
}

/// A workflow's identity and mutable metadata.
///
/// Invariant: `public_slug` is `Some` iff `is_public` is true.
/// Invariant: `active_version`, when non-zero, references a version whose
/// `status` is [`VersionStatus::Published`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier.
    pub id: WorkflowId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Display name, bounded by `MAX_WORKFLOW_NAME_LENGTH`.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Currently active, published version (0 = never published).
    pub active_version: VersionNumber,
    /// Advisory single-editor lock: locked when `Some`.
    pub locked_by: Option<String>,
    /// Whether the workflow is disabled (blocks all triggers).
    pub is_disabled: bool,
    /// Whether the workflow is reachable through the public surface.
    pub is_public: bool,
    /// Globally unique public slug, set iff `is_public`.
    pub public_slug: Option<String>,
    /// Public access mode, meaningful only when `is_public`.
    pub public_access_mode: PublicAccessMode,
    /// Public branding, meaningful only when `is_public`.
    pub public_branding: PublicBranding,
    /// Per-workflow override of the public rate limit.
    pub public_rate_limit: Option<PublicRateLimit>,
}

impl Workflow {
    /// Returns true if the workflow's public-facing invariant holds.
    #[must_use]
    pub fn public_invariant_holds(&self) -> bool {
        self.is_public == self.public_slug.is_some()
    }
}

/// Lifecycle status of a workflow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Mutable; not yet eligible to run.
    Draft,
    /// Immutable; eligible to run and to become `active_version`.
    Published,
}

/// What causes a workflow version to begin executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Interactive trigger from an authenticated UI session.
    Interactive,
    /// Authenticated API trigger.
    Api,
    /// Scheduled (cron-like) trigger.
    Schedule,
    /// Webhook/event-source trigger.
    Hook,
    /// Vision/perception trigger (e.g. camera-fed automation).
    Vision,
}

/// An immutable (once published) snapshot of a workflow's block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Version number; `(workflow_id, version)` is the composite identity.
    pub version: VersionNumber,
    /// Draft or published.
    pub status: VersionStatus,
    /// What causes this version to run.
    pub trigger_type: TriggerType,
    /// Opaque trigger configuration (schedule cron, hook secret, etc).
    pub trigger_config: Value,
    /// Platform targets this version is authored for.
    pub execution_environments: Vec<String>,
    /// Free-text changelog entry for this version.
    pub changelog: Option<String>,
    /// Ordered block list, `order` ascending and unique.
    pub blocks: Vec<Block>,
}

// ============================================================================
// SECTION: Block
// ============================================================================

/// The closed set of block types the interpreter can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Pure object transform.
    Object,
    /// Pure string transform.
    String,
    /// Pure array transform.
    Array,
    /// Pure numeric transform.
    Math,
    /// Pure date/time transform.
    Date,
    /// Shape-normalization transform.
    Normalize,
    /// Platform-bound location lookup.
    Location,
    /// HTTP client call.
    Fetch,
    /// LLM invocation.
    Agent,
    /// Flow-control jump/loop directive.
    Goto,
    /// Scoped, cancellable sleep.
    Sleep,
    /// Interactive camera capture prompt.
    UiCamera,
    /// Interactive form prompt.
    UiForm,
    /// Interactive tabular display/selection prompt.
    UiTable,
    /// Interactive detail-view prompt.
    UiDetails,
    /// Platform-bound image operation.
    Image,
    /// Platform-bound filesystem operation.
    Filesystem,
    /// Platform-bound FTP operation.
    Ftp,
    /// Sandboxed user code execution.
    Code,
    /// Platform-bound video operation.
    Video,
    /// Agent-backed validation (sugar over `agent`).
    Validation,
}

impl BlockType {
    /// Returns true if this block type's handler must return a pause
    /// directive rather than complete synchronously.
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::UiCamera | Self::UiForm | Self::UiTable | Self::UiDetails)
    }

    /// Returns true if this block type is platform-bound and may be
    /// unregistered on some execution environments.
    #[must_use]
    pub const fn is_platform_bound(self) -> bool {
        matches!(self, Self::Image | Self::Filesystem | Self::Ftp | Self::Video | Self::Location)
    }
}

/// A single AND-gated predicate evaluated by the Condition Evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Left-hand operand; resolved through the reference resolver.
    pub left: Value,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Right-hand operand; resolved through the reference resolver. Absent
    /// for unary operators (`isEmpty`, `isFalsy`, `isNull`).
    #[serde(default)]
    pub right: Option<Value>,
}

/// The closed set of condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Lte,
    /// `>=`
    Gte,
    /// Substring/subsequence containment.
    Contains,
    /// String prefix match.
    StartsWith,
    /// String suffix match.
    EndsWith,
    /// Set membership (right operand is a sequence).
    In,
    /// True when the resolved left operand is empty.
    IsEmpty,
    /// True when the resolved left operand is JSON-falsy.
    IsFalsy,
    /// True when the resolved left operand is `null`/missing.
    IsNull,
    /// ECMA-compatible regex match; right operand is the pattern.
    Regex,
}

/// A typed, declaratively-configured unit of work inside a workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier, unique within a version.
    pub id: BlockId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Owning workflow version.
    pub workflow_version: VersionNumber,
    /// Author-facing name.
    pub name: String,
    /// Closed-set block type.
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Opaque, type-specific configuration.
    pub logic: Value,
    /// Ordered, AND-gated guard predicates.
    pub conditions: Vec<Condition>,
    /// Non-negative, unique-within-version ordering key.
    pub order: u32,
    /// Free-text author notes.
    pub notes: Option<String>,
}

// ============================================================================
// SECTION: Run & Step
// ============================================================================

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet started.
    Pending,
    /// Actively executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
    /// Paused at an interactive block, awaiting `submit-action`.
    AwaitingAction,
}

impl RunStatus {
    /// Returns true if this status is terminal (no further transitions).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of an individual step (block execution record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet evaluated.
    Pending,
    /// Currently dispatching.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Guard conditions evaluated false; block was not dispatched.
    Skipped,
}

/// Machine-readable error detail attached to a failed step or run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    /// Closed-set error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// The record of executing (or skipping) one block within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Nanoid step identifier.
    pub step_id: StepId,
    /// The block this step executed.
    pub block_id: BlockId,
    /// Terminal or in-flight status.
    pub status: StepStatus,
    /// Dispatch start time (absent for skipped steps).
    pub started_at: Option<Timestamp>,
    /// Dispatch end time (absent for skipped or still-running steps).
    pub ended_at: Option<Timestamp>,
    /// Error detail when `status == Failed`.
    pub error: Option<StepError>,
    /// Short, human-readable summary of the handler's output.
    pub output_summary: Option<String>,
}

/// A persisted run: one execution instance of a specific workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Workflow this run belongs to.
    pub workflow_id: WorkflowId,
    /// Workflow version this run executes.
    pub version: VersionNumber,
    /// Owning organization.
    pub org_id: OrgId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// What triggered this run.
    pub trigger_type: TriggerType,
    /// Run start time.
    pub started_at: Timestamp,
    /// Run completion time, set once terminal.
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in milliseconds, set once terminal.
    pub duration_ms: Option<u64>,
    /// Top-level error message, set when `status == Failed`.
    pub error_message: Option<String>,
    /// Ordered step records.
    pub steps: Vec<Step>,
    /// Free-form metadata (caller-supplied, device/platform info, etc).
    pub metadata: BTreeMap<String, Value>,
    /// Serialized continuation, present iff `status == AwaitingAction`.
    pub resume_marker: Option<ResumeMarker>,
}

/// A serialized continuation persisted on a paused run: pause/resume is
/// modeled as resuming a serialized continuation, not as a live suspended
/// call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMarker {
    /// Opaque token; a duplicate `submit-action` delivery with a mismatched
    /// token is rejected rather than silently re-applied.
    pub token: String,
    /// The interactive block the run paused at.
    pub block_id: BlockId,
    /// The bind path the external response should be written to.
    pub bind_value: Option<String>,
    /// Zero-based index of the paused block within the version's block list.
    pub step_index: usize,
    /// Snapshotted `state` at the moment of pause.
    pub state: BTreeMap<String, Value>,
    /// Snapshotted `cache` at the moment of pause.
    pub cache: BTreeMap<String, Value>,
    /// Snapshotted artifacts at the moment of pause.
    pub artifacts: Vec<Artifact>,
    /// Snapshotted loop states at the moment of pause.
    pub loops: BTreeMap<String, Value>,
    /// Synchronous goto-chain depth at the moment of pause.
    pub goto_depth: u32,
}

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// Kind of binary asset produced or consumed during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Generic document.
    Document,
    /// Structured (non-binary) data payload.
    Data,
    /// Audio clip.
    Audio,
}

/// Discriminator for an artifact overlay annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Detected barcode/QR region.
    Barcode,
    /// Detected text region.
    Text,
    /// UI-marker region (interactive prompt annotation).
    UiMarker,
}

/// A normalized-coordinate polygon overlay on an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// What this overlay marks.
    pub kind: OverlayKind,
    /// Polygon vertices in `[0.0, 1.0]` normalized coordinates.
    pub points: Vec<(f64, f64)>,
    /// Optional label (decoded barcode value, recognized text, etc).
    pub label: Option<String>,
}

/// A binary asset produced or consumed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact identifier.
    pub id: ArtifactId,
    /// Owning run.
    pub run_id: RunId,
    /// Owning workflow.
    pub workflow_id: WorkflowId,
    /// Artifact media kind.
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    /// Display name.
    pub name: String,
    /// Local filesystem path, when stored locally.
    pub file_path: Option<String>,
    /// Remote URL, when stored remotely.
    pub file_url: Option<String>,
    /// Size in bytes, when known.
    pub file_size: Option<u64>,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// Pixel width, for image/video artifacts.
    pub width: Option<u32>,
    /// Pixel height, for image/video artifacts.
    pub height: Option<u32>,
    /// Annotated overlay regions.
    pub overlays: Vec<Overlay>,
    /// Thumbnail path, when generated.
    pub thumbnail_path: Option<String>,
    /// Free-text provenance (which handler produced this artifact).
    pub source: String,
    /// Block that produced this artifact.
    pub block_id: BlockId,
    /// Creation time.
    pub created_at: Timestamp,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn workflow_public_invariant_detects_violation() {
        let mut workflow = Workflow {
            id: WorkflowId::new("wf-1"),
            org_id: OrgId::new("org-1"),
            name: "demo".to_string(),
            description: None,
            active_version: VersionNumber::UNPUBLISHED,
            locked_by: None,
            is_disabled: false,
            is_public: true,
            public_slug: None,
            public_access_mode: PublicAccessMode::View,
            public_branding: PublicBranding::default(),
            public_rate_limit: None,
        };
        assert!(!workflow.public_invariant_holds());
        workflow.public_slug = Some("demo-slug".to_string());
        assert!(workflow.public_invariant_holds());
    }

    #[test]
    fn run_status_terminal_classification() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::AwaitingAction.is_terminal());
    }

    #[test]
    fn block_type_classification() {
        assert!(BlockType::UiForm.is_interactive());
        assert!(!BlockType::Fetch.is_interactive());
        assert!(BlockType::Filesystem.is_platform_bound());
        assert!(!BlockType::Math.is_platform_bound());
    }
}
