//! Authentication for the VDS broker.
//!
//! This crate provides the two halves of end-user authentication:
//!
//! - **Directory authentication**: the `Directory` trait and its HTTP binding,
//!   used once per login to check a username and password
//! - **Sealed session tokens**: `TokenService`, which issues and verifies the
//!   stateless token a client presents on every later request
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  login   ┌──────────────────────┐
//! │   Gateway        │─────────▶│  Directory (trait)   │
//! │   (pipeline)     │          └──────────┬───────────┘
//! │                  │                     │ HTTP
//! │                  │          ┌──────────▼───────────┐
//! │                  │          │  HttpDirectoryClient │
//! │                  │          └──────────────────────┘
//! │                  │  token   ┌──────────────────────┐
//! │                  │─────────▶│  TokenService        │
//! └──────────────────┘          │  (ChaCha20-Poly1305) │
//!                               └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use vds_auth::TokenService;
//!
//! let tokens = TokenService::from_secret("correct horse battery staple").unwrap();
//! let token = tokens.issue("alice");
//! assert_eq!(tokens.verify(token.as_str()).unwrap(), "alice");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod directory;
pub mod error;
pub mod token;

pub use client::{BindRequest, HttpDirectoryClient};
pub use directory::Directory;
pub use error::{AuthError, Result};
pub use token::{Token, TokenService, DEFAULT_TTL};

#[cfg(any(test, feature = "test-utils"))]
pub use directory::StaticDirectory;

/// Configuration for binding to the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    base_url: String,
    domain: String,
}

impl DirectoryConfig {
    /// Create a directory configuration.
    ///
    /// No network access happens here.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfig` if the domain is empty or has an
    /// empty label, or the URL is empty.
    pub fn new(base_url: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let domain = domain.into().trim().trim_matches('.').to_ascii_lowercase();

        if base_url.is_empty() {
            return Err(AuthError::InvalidConfig(
                "directory URL is empty".to_string(),
            ));
        }
        if domain.is_empty() {
            return Err(AuthError::InvalidConfig(
                "directory domain is empty".to_string(),
            ));
        }
        if domain.split('.').any(str::is_empty) {
            return Err(AuthError::InvalidConfig(format!(
                "directory domain has an empty label: {domain}"
            )));
        }

        Ok(Self { base_url, domain })
    }

    /// The directory domain (e.g. `corp.example.com`).
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Search base derived from the domain (e.g. `dc=corp,dc=example,dc=com`).
    #[must_use]
    pub fn base_dn(&self) -> String {
        self.domain
            .split('.')
            .map(|label| format!("dc={label}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// User principal for a login name (`<user>@<domain>`).
    #[must_use]
    pub fn user_principal(&self, username: &str) -> String {
        format!("{username}@{}", self.domain)
    }

    /// Get the bind endpoint URL.
    #[must_use]
    pub fn bind_url(&self) -> String {
        format!("{}/v1/bind", self.base_url)
    }
}
