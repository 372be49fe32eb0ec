// workflow-core/src/ids.rs
// ============================================================================
// Module: Workflow Engine Identifiers
// Description: Canonical opaque identifiers for workflows, runs, and blocks.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, nanoid
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as plain strings. Validation of
//! identifier *content* (e.g. org ownership) happens at the repository or
//! interpreter boundary, not in these wrapper types.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Declares a newtype identifier that serializes transparently as a string.
macro_rules! declare_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

declare_id!(
    /// Organization identifier that scopes workflows, runs, and keys.
    OrgId
);
declare_id!(
    /// Workflow identifier, stable across versions.
    WorkflowId
);
declare_id!(
    /// Block identifier, unique within a workflow version.
    BlockId
);
declare_id!(
    /// Run identifier, one per execution instance of a workflow version.
    RunId
);
declare_id!(
    /// Step identifier, assigned by [`crate::ids::new_step_id`] (nanoid).
    StepId
);
declare_id!(
    /// Artifact identifier.
    ArtifactId
);
declare_id!(
    /// Credential (key) identifier.
    KeyId
);
declare_id!(
    /// Key audit entry identifier.
    AuditEntryId
);
declare_id!(
    /// User identifier, as supplied by the identity layer.
    UserId
);
declare_id!(
    /// Public-run record identifier.
    PublicRunId
);

/// Workflow version number. Versions are sequential starting at 1; `0` on a
/// [`crate::model::Workflow`] means "never published".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionNumber(u32);

impl VersionNumber {
    /// Sentinel meaning "no published version yet".
    pub const UNPUBLISHED: Self = Self(0);

    /// Creates a version number from a raw integer.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns true if this is the "never published" sentinel.
    #[must_use]
    pub const fn is_unpublished(self) -> bool {
        self.0 == 0
    }

    /// Returns the next sequential version number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Length of generated step identifiers, matching the nanoid default.
const STEP_ID_LENGTH: usize = 21;

/// Generates a new nanoid-style step identifier.
#[must_use]
pub fn new_step_id() -> StepId {
    StepId::new(nanoid::nanoid!(STEP_ID_LENGTH))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions are permitted."
)]
mod tests {
    use super::*;

    #[test]
    fn version_number_unpublished_sentinel() {
        assert!(VersionNumber::UNPUBLISHED.is_unpublished());
        assert_eq!(VersionNumber::new(1).next().value(), 2);
    }

    #[test]
    fn step_ids_are_unique() {
        let a = new_step_id();
        let b = new_step_id();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), STEP_ID_LENGTH);
    }

    #[test]
    fn id_round_trips_through_json() {
        let id = WorkflowId::new("wf-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"wf-1\"");
        let back: WorkflowId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
