// workflow-core/src/events.rs
// ============================================================================
// Module: Workflow Engine Event Shapes
// Description: The closed set of lifecycle and step events the engine emits.
// Purpose: Give every event a single serializable shape independent of the
//          transport (SSE, WebSocket-style framed channel) that carries it.
// Dependencies: serde, serde_json, crate::{ids, time}
// ============================================================================

//! ## Overview
//! Events are tagged unions so a subscriber can dispatch on `type` without
//! ambiguity. The fan-out registry (`workflow-events`) never inspects the
//! payload; it only serializes and forwards.

use serde::Deserialize;
use serde::Serialize;

use crate::ids::BlockId;
use crate::ids::RunId;
use crate::ids::StepId;
use crate::ids::WorkflowId;
use crate::model::StepStatus;
use crate::time::Timestamp;

/// A single published event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkflowEvent {
    /// A run began executing.
    #[serde(rename = "run:started")]
    RunStarted {
        /// The run that started.
        #[serde(rename = "runId")]
        run_id: RunId,
        /// Its workflow.
        #[serde(rename = "workflowId")]
        workflow_id: WorkflowId,
        /// What triggered it.
        #[serde(rename = "triggerType")]
        trigger_type: crate::model::TriggerType,
    },
    /// One block finished dispatching (or was skipped).
    #[serde(rename = "run:step")]
    RunStep {
        /// Owning run.
        #[serde(rename = "runId")]
        run_id: RunId,
        /// The step's identifier.
        #[serde(rename = "stepId")]
        step_id: StepId,
        /// The block this step executed.
        #[serde(rename = "blockId")]
        block_id: BlockId,
        /// Terminal or in-flight status for this step.
        status: StepStatus,
    },
    /// A run finished successfully.
    #[serde(rename = "run:completed")]
    RunCompleted {
        /// The run that completed.
        #[serde(rename = "runId")]
        run_id: RunId,
        /// Total wall-clock duration.
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    /// A run finished with an error.
    #[serde(rename = "run:failed")]
    RunFailed {
        /// The run that failed.
        #[serde(rename = "runId")]
        run_id: RunId,
        /// Top-level error message.
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
    /// A run paused at an interactive block.
    #[serde(rename = "run:awaiting_action")]
    RunAwaitingAction {
        /// The paused run.
        #[serde(rename = "runId")]
        run_id: RunId,
        /// The block awaiting a response.
        #[serde(rename = "blockId")]
        block_id: BlockId,
        /// The interactive block's type, as a string (`ui_form`, etc).
        #[serde(rename = "actionType")]
        action_type: String,
    },
    /// A workflow's metadata or active version changed.
    #[serde(rename = "workflow:updated")]
    WorkflowUpdated {
        /// The workflow that changed.
        #[serde(rename = "workflowId")]
        workflow_id: WorkflowId,
    },
    /// A workflow was deleted.
    #[serde(rename = "workflow:deleted")]
    WorkflowDeleted {
        /// The workflow that was deleted.
        #[serde(rename = "workflowId")]
        workflow_id: WorkflowId,
    },
}

impl WorkflowEvent {
    /// Returns the event's wire `type` tag.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run:started",
            Self::RunStep { .. } => "run:step",
            Self::RunCompleted { .. } => "run:completed",
            Self::RunFailed { .. } => "run:failed",
            Self::RunAwaitingAction { .. } => "run:awaiting_action",
            Self::WorkflowUpdated { .. } => "workflow:updated",
            Self::WorkflowDeleted { .. } => "workflow:deleted",
        }
    }
}

/// An event paired with its emission timestamp, ready for transport framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEvent {
    /// The event payload.
    #[serde(flatten)]
    pub event: WorkflowEvent,
    /// Emission time, ISO-8601.
    pub timestamp: Timestamp,
}

impl TimestampedEvent {
    /// Stamps an event with the current time.
    #[must_use]
    pub fn now(event: WorkflowEvent) -> Self {
        Self { event, timestamp: Timestamp::now() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::ids::WorkflowId;

    #[test]
    fn run_started_serializes_with_tag_and_camel_case_fields() {
        let event = WorkflowEvent::RunStarted {
            run_id: RunId::new("r1"),
            workflow_id: WorkflowId::new("w1"),
            trigger_type: crate::model::TriggerType::Api,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run:started");
        assert_eq!(json["payload"]["runId"], "r1");
        assert_eq!(json["payload"]["workflowId"], "w1");
    }

    #[test]
    fn type_name_matches_serialized_tag() {
        let event = WorkflowEvent::WorkflowDeleted { workflow_id: WorkflowId::new("w1") };
        assert_eq!(event.type_name(), "workflow:deleted");
    }
}
