//! Directory-service authentication.

use async_trait::async_trait;
use vds_core::Identity;

use crate::error::Result;

/// Authenticates end users against a directory service.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Check `username`/`password` and return the authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the directory rejects the
    /// credentials, or `AuthError::DirectoryUnavailable` if it cannot be asked.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use fake::StaticDirectory;

#[cfg(any(test, feature = "test-utils"))]
mod fake {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use vds_core::Identity;

    use super::Directory;
    use crate::error::{AuthError, Result};

    /// An in-memory directory for testing.
    ///
    /// Accepts exactly the configured username/password pairs. An unavailable
    /// directory fails every call with `DirectoryUnavailable`.
    #[derive(Debug, Default, Clone)]
    pub struct StaticDirectory {
        users: HashMap<String, String>,
        unavailable: bool,
    }

    impl StaticDirectory {
        /// Create an empty directory.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a user.
        #[must_use]
        pub fn with_user(mut self, username: &str, password: &str) -> Self {
            self.users
                .insert(username.to_string(), password.to_string());
            self
        }

        /// Create a directory that cannot be reached.
        #[must_use]
        pub fn unavailable() -> Self {
            Self {
                users: HashMap::new(),
                unavailable: true,
            }
        }
    }

    #[async_trait]
    impl Directory for StaticDirectory {
        async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
            if self.unavailable {
                return Err(AuthError::DirectoryUnavailable(
                    "static directory is offline".to_string(),
                ));
            }

            match self.users.get(username) {
                Some(expected) if expected == password && !password.is_empty() => {
                    Identity::new(username)
                        .map_err(|e| AuthError::InvalidCredentials(e.to_string()))
                }
                _ => Err(AuthError::InvalidCredentials(format!("user={username}"))),
            }
        }
    }
}
