//! Authentication error types.

use thiserror::Error;
use vds_core::BrokerError;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while issuing tokens or authenticating users.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token has outlived its time-to-live.
    #[error("token expired")]
    TokenExpired,

    /// The token could not be decoded, opened, or parsed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The directory rejected the supplied credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The directory could not be reached or answered unexpectedly.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The directory client configuration is unusable.
    #[error("invalid directory configuration: {0}")]
    InvalidConfig(String),

    /// The token key material is unusable.
    #[error("invalid token key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    /// Returns `true` if the error concerns the token presented by the client.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::InvalidToken(_))
    }
}

impl From<AuthError> for BrokerError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => Self::InvalidToken("token expired".to_string()),
            AuthError::InvalidToken(msg) => Self::InvalidToken(msg),
            AuthError::InvalidCredentials(msg) => Self::AuthFailure(msg),
            AuthError::DirectoryUnavailable(msg) | AuthError::InvalidConfig(msg) => {
                Self::directory_unavailable(msg)
            }
            AuthError::InvalidKey(msg) => Self::MalformedInput(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vds_core::Backend;

    #[test]
    fn token_errors_collapse_to_invalid_token() {
        assert!(matches!(
            BrokerError::from(AuthError::TokenExpired),
            BrokerError::InvalidToken(_)
        ));
        assert!(matches!(
            BrokerError::from(AuthError::InvalidToken("bad tag".into())),
            BrokerError::InvalidToken(_)
        ));
    }

    #[test]
    fn credential_errors_become_auth_failure() {
        assert!(matches!(
            BrokerError::from(AuthError::InvalidCredentials("user=bob".into())),
            BrokerError::AuthFailure(_)
        ));
    }

    #[test]
    fn directory_errors_name_the_backend() {
        let err = BrokerError::from(AuthError::DirectoryUnavailable("refused".into()));
        assert!(matches!(
            err,
            BrokerError::BackendUnavailable {
                backend: Backend::Directory,
                ..
            }
        ));
    }

    #[test]
    fn token_error_predicate() {
        assert!(AuthError::TokenExpired.is_token_error());
        assert!(AuthError::InvalidToken(String::new()).is_token_error());
        assert!(!AuthError::InvalidCredentials(String::new()).is_token_error());
    }
}
