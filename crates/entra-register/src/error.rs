//! Error types for the registration reconciler.
//!
//! Every failure aborts the run. Ambiguous lookups and pending admin consent
//! are not errors; they surface as [`crate::reconcile::Warning`] values.

/// Errors that abort a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A required external tool is not installed or not on `PATH`.
    #[error("Required tool `{tool}` was not found on PATH")]
    MissingDependency {
        /// Name or path of the missing executable.
        tool: String,
    },

    /// The current session is not signed in to the identity provider.
    #[error("Not authenticated: {message}")]
    NotAuthenticated {
        /// Provider message, with a hint on how to sign in.
        message: String,
    },

    /// A call to the identity provider returned a failure status.
    #[error("{operation} failed: {message}")]
    ExternalCall {
        /// Human-readable name of the failed operation.
        operation: String,
        /// Diagnostic from the provider or the command's stderr.
        message: String,
    },

    /// The provider answered, but the payload could not be decoded.
    #[error("{operation} returned an unexpected response: {source}")]
    InvalidResponse {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// The session resolved to an empty tenant identifier.
    #[error("Tenant identifier for the current session is empty")]
    EmptyTenant,
}

impl ReconcileError {
    pub fn external(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCall {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(operation: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            source,
        }
    }

    /// Process exit code for this error.
    ///
    /// Precondition failures get their own codes so wrappers can tell
    /// "install az" and "run az login" apart from a failed provider call.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingDependency { .. } => 3,
            Self::NotAuthenticated { .. } => 4,
            Self::ExternalCall { .. } | Self::InvalidResponse { .. } | Self::EmptyTenant => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_for_preconditions() {
        let missing = ReconcileError::MissingDependency {
            tool: "az".to_string(),
        };
        let unauth = ReconcileError::NotAuthenticated {
            message: "run az login".to_string(),
        };
        let external = ReconcileError::external("Create application", "boom");

        assert_eq!(missing.exit_code(), 3);
        assert_eq!(unauth.exit_code(), 4);
        assert_eq!(external.exit_code(), 1);
        assert_eq!(ReconcileError::EmptyTenant.exit_code(), 1);
    }

    #[test]
    fn test_external_call_message_names_operation() {
        let err = ReconcileError::external("Add API permission", "Insufficient privileges");
        assert_eq!(
            err.to_string(),
            "Add API permission failed: Insufficient privileges"
        );
    }
}
