// workflow-core/src/audit.rs
// ============================================================================
// Module: Ambient Audit Logging
// Description: Structured, pluggable audit events for cross-cutting logging.
// Purpose: Let every crate in the workspace emit redacted audit events
//          without depending on a tracing/logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A small trait with a required `record` method and a closed set of event
//! shapes, plus stderr/file/noop sinks a host process selects at startup.
//! It is distinct from the persisted [`crate::model`] audit trail (e.g. a
//! credential store's append-only `KeyAuditEntry` rows) — this module is for
//! process-local structured logs, not durable records.

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

/// A single audit event, tagged by `event`.
///
/// Kept as one flexible shape (rather than a family of structs) because the
/// engine's audit surface spans several unrelated components (credential
/// access, run lifecycle, rate limiting); sinks key off `event` to decide
/// formatting or routing.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Event identifier (e.g. `"key.accessed"`, `"run.failed"`, `"rate_limited"`).
    pub event: &'static str,
    /// Event timestamp, milliseconds since epoch.
    pub timestamp_ms: u128,
    /// Organization scope, when applicable.
    pub org_id: Option<String>,
    /// Workflow scope, when applicable.
    pub workflow_id: Option<String>,
    /// Run scope, when applicable.
    pub run_id: Option<String>,
    /// Free-text detail; sinks are expected to redact secrets before calling.
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Builds an event stamped with the current time.
    #[must_use]
    pub fn now(event: &'static str) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
        Self { event, timestamp_ms, org_id: None, workflow_id: None, run_id: None, detail: None }
    }

    /// Sets the organization scope.
    #[must_use]
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Sets the workflow scope.
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    /// Sets the run scope.
    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the free-text detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit sink for engine-wide structured events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that writes JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Audit sink that discards every event.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_any_event() {
        let sink = NoopAuditSink;
        sink.record(&AuditEvent::now("key.accessed").with_org("org-1"));
    }

    #[test]
    fn event_builder_sets_scopes() {
        let event = AuditEvent::now("run.failed").with_org("org-1").with_run("run-1");
        assert_eq!(event.org_id.as_deref(), Some("org-1"));
        assert_eq!(event.run_id.as_deref(), Some("run-1"));
        assert!(event.workflow_id.is_none());
    }
}
