//! Domain failure taxonomy for the VDS broker.
//!
//! Every failure that can escape a pipeline stage or a route handler is one of
//! the kinds below. Crate-local errors (`AuthError`, `HypervisorError`) convert
//! into `BrokerError`, and the gateway translates a `BrokerError` into an HTTP
//! response exactly once per request.

use std::fmt;

use thiserror::Error;

/// A result type using `BrokerError`.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// The external backend a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// The directory service used to authenticate end users.
    Directory,
    /// The hypervisor management API hosting the virtual desktops.
    Hypervisor,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Hypervisor => f.write_str("hypervisor"),
        }
    }
}

/// The closed set of domain failure kinds.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// End-user credentials were rejected, or the user may not act on a resource.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// A token was missing, corrupted, expired, or otherwise unusable.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A backend could not be reached or could not execute an operation.
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable {
        /// Which backend failed.
        backend: Backend,
        /// Operator-facing detail.
        message: String,
    },

    /// A backend refused an operation that is not applicable in the current state.
    #[error("operation rejected: {0}")]
    BackendOperationRejected(String),

    /// Client input was structurally invalid.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl BrokerError {
    /// Shorthand for a directory `BackendUnavailable` failure.
    #[must_use]
    pub fn directory_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: Backend::Directory,
            message: message.into(),
        }
    }

    /// Shorthand for a hypervisor `BackendUnavailable` failure.
    #[must_use]
    pub fn hypervisor_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: Backend::Hypervisor,
            message: message.into(),
        }
    }

    /// Short, stable name of the failure kind, used as a structured log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailure(_) => "auth_failure",
            Self::InvalidToken(_) => "invalid_token",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendOperationRejected(_) => "backend_operation_rejected",
            Self::MalformedInput(_) => "malformed_input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_display() {
        let err = BrokerError::directory_unavailable("connection refused");
        assert_eq!(err.to_string(), "directory unavailable: connection refused");

        let err = BrokerError::hypervisor_unavailable("timeout");
        assert_eq!(err.to_string(), "hypervisor unavailable: timeout");
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            BrokerError::AuthFailure(String::new()).kind(),
            BrokerError::InvalidToken(String::new()).kind(),
            BrokerError::hypervisor_unavailable("").kind(),
            BrokerError::BackendOperationRejected(String::new()).kind(),
            BrokerError::MalformedInput(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
