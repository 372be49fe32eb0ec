// workflow-core/src/interfaces.rs
// ============================================================================
// Module: Workflow Engine Persistence & Collaborator Contracts
// Description: Abstract interfaces the interpreter calls into.
// Purpose: Keep the interpreter backend-agnostic; concrete stores, credential
//          resolution, and event publication live in separate crates.
// Dependencies: async-trait, thiserror, crate::{ids, model, time}
// ============================================================================

//! ## Overview
//! The interpreter never depends on a concrete database, encryption scheme,
//! or transport. It depends on these traits; [`workflow-store-sqlite`],
//! [`workflow-credentials`], and [`workflow-events`] provide the
//! implementations for the engine's three external collaborators: run
//! persistence, secret resolution, and event publication.

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::OrgId;
use crate::ids::RunId;
use crate::ids::WorkflowId;
use crate::model::Run;
use crate::model::Workflow;
use crate::model::WorkflowVersion;

// ============================================================================
// SECTION: Run Persistence
// ============================================================================

/// Run persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage I/O error.
    #[error("run store io error: {0}")]
    Io(String),
    /// Requested run does not exist.
    #[error("run not found: {0}")]
    NotFound(String),
    /// Stored data failed to deserialize or violated an invariant.
    #[error("run store data invalid: {0}")]
    Invalid(String),
}

/// Persists and loads [`Run`] rows and resolves the workflow/version snapshot
/// a run executes against.
///
/// # Errors
/// Every method returns [`StoreError`] on I/O failure or data corruption;
/// "not found" is represented with `Ok(None)` for lookups and
/// `Err(StoreError::NotFound)` for operations that require the row to exist.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Loads a run by id.
    async fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;

    /// Persists a run, inserting or overwriting the row with this id.
    async fn save_run(&self, run: &Run) -> Result<(), StoreError>;

    /// Loads the frozen `(workflow, version)` snapshot a run executes.
    async fn load_version(
        &self,
        workflow_id: &WorkflowId,
        version: crate::ids::VersionNumber,
    ) -> Result<Option<WorkflowVersion>, StoreError>;

    /// Loads workflow metadata (used for public-gate and branding lookups).
    async fn load_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<Workflow>, StoreError>;
}

// ============================================================================
// SECTION: Secret Resolution
// ============================================================================

/// Secret resolution errors.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Underlying credential store error.
    #[error("secret resolution error: {0}")]
    Store(String),
}

/// Resolves the `secrets` scope populated into a [`crate::context::WorkflowContext`]
/// at run start. Implemented by `workflow-credentials`.
///
/// # Errors
/// Returns [`SecretError`] if the underlying store cannot be reached; a
/// missing or revoked key is represented by its absence from the returned
/// map, not an error.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolves every key visible to `(org_id, workflow_id)` into a flat
    /// `name -> plaintext` map for the duration of one run.
    async fn resolve_all(
        &self,
        org_id: &OrgId,
        workflow_id: &WorkflowId,
    ) -> Result<std::collections::BTreeMap<String, String>, SecretError>;
}

// ============================================================================
// SECTION: Event Publication
// ============================================================================

/// Event publication errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be serialized.
    #[error("event serialization error: {0}")]
    Serialize(String),
}

/// Publishes lifecycle and step events to the event fan-out registry.
/// Implemented by `workflow-events`.
///
/// # Errors
/// Returns [`PublishError`] only when the event itself fails to serialize;
/// delivery to individual subscribers is best-effort and never surfaces an
/// error to the publisher.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event to a single channel.
    async fn publish(&self, channel: &str, event: &crate::events::WorkflowEvent) -> Result<(), PublishError>;

    /// Publishes an event to every channel in `channels`.
    async fn publish_many(
        &self,
        channels: &[String],
        event: &crate::events::WorkflowEvent,
    ) -> Result<(), PublishError> {
        for channel in channels {
            self.publish(channel, event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_includes_detail() {
        let err = StoreError::NotFound("run-1".to_string());
        assert_eq!(err.to_string(), "run not found: run-1");
    }
}
