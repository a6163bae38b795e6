//! Error types for the hypervisor binding and session guard.

use thiserror::Error;
use vds_core::BrokerError;

/// A result type using `HypervisorError`.
pub type Result<T> = std::result::Result<T, HypervisorError>;

/// Errors that can occur while talking to the hypervisor.
#[derive(Debug, Error)]
pub enum HypervisorError {
    /// A guarded operation was attempted before the session handshake.
    #[error("hypervisor session not authenticated yet")]
    NotAuthenticated,

    /// The hypervisor rejected the broker's own credentials.
    #[error("hypervisor authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The VM is not in a power state where the operation applies.
    #[error("VM {0} is not in an appropriate power state")]
    BadPowerState(String),

    /// No VM with the given uuid exists.
    #[error("unknown VM: {0}")]
    UnknownVm(String),

    /// The hypervisor returned a failure not covered above.
    #[error("hypervisor call {method} failed: {code} {details:?}")]
    Rpc {
        /// The remote method.
        method: String,
        /// The failure code.
        code: String,
        /// Failure parameters, as returned.
        details: Vec<String>,
    },

    /// The hypervisor could not be reached or answered garbage.
    #[error("hypervisor transport error: {0}")]
    Transport(String),
}

impl HypervisorError {
    /// Returns `true` if the operation was refused because it does not apply
    /// to the VM's current state, as opposed to a hard backend failure.
    #[must_use]
    pub const fn is_not_applicable(&self) -> bool {
        matches!(self, Self::BadPowerState(_))
    }
}

impl From<HypervisorError> for BrokerError {
    fn from(err: HypervisorError) -> Self {
        match err {
            HypervisorError::BadPowerState(_) | HypervisorError::UnknownVm(_) => {
                Self::BackendOperationRejected(err.to_string())
            }
            HypervisorError::NotAuthenticated
            | HypervisorError::AuthenticationFailed(_)
            | HypervisorError::Rpc { .. }
            | HypervisorError::Transport(_) => Self::hypervisor_unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vds_core::Backend;

    #[test]
    fn not_applicable_is_only_bad_power_state() {
        assert!(HypervisorError::BadPowerState("abc".into()).is_not_applicable());
        assert!(!HypervisorError::UnknownVm("abc".into()).is_not_applicable());
        assert!(!HypervisorError::NotAuthenticated.is_not_applicable());
    }

    #[test]
    fn hard_failures_are_hypervisor_unavailable() {
        for err in [
            HypervisorError::NotAuthenticated,
            HypervisorError::AuthenticationFailed("root".into()),
            HypervisorError::Transport("connection refused".into()),
            HypervisorError::Rpc {
                method: "VM.get_all".into(),
                code: "INTERNAL_ERROR".into(),
                details: vec![],
            },
        ] {
            assert!(matches!(
                BrokerError::from(err),
                BrokerError::BackendUnavailable {
                    backend: Backend::Hypervisor,
                    ..
                }
            ));
        }
    }

    #[test]
    fn state_failures_are_rejections() {
        assert!(matches!(
            BrokerError::from(HypervisorError::BadPowerState("abc".into())),
            BrokerError::BackendOperationRejected(_)
        ));
        assert!(matches!(
            BrokerError::from(HypervisorError::UnknownVm("abc".into())),
            BrokerError::BackendOperationRejected(_)
        ));
    }
}
