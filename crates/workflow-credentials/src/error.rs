// workflow-credentials/src/error.rs
// ============================================================================
// Module: Credential Store Errors
// Description: Fallible outcomes for key repository and resolution calls.
// Purpose: Give the credential store one error type distinct from the
//          engine-wide SecretError the interpreter observes.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

use crate::crypto::CryptoError;

/// Credential repository and resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Underlying repository I/O error.
    #[error("credential store io error: {0}")]
    Io(String),
    /// The requested key does not exist.
    #[error("key not found: {0}")]
    NotFound(String),
    /// A create/rotate call violated the `(org, workflow, name)` uniqueness
    /// invariant.
    #[error("key already exists: org={org_id} workflow={workflow_id:?} name={name}")]
    AlreadyExists {
        /// Owning organization.
        org_id: String,
        /// Scoping workflow, if any.
        workflow_id: Option<String>,
        /// Conflicting name.
        name: String,
    },
    /// Encryption or decryption of the key's value failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_key_id() {
        let err = CredentialError::NotFound("key-1".to_string());
        assert_eq!(err.to_string(), "key not found: key-1");
    }
}
