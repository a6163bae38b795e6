//! HTTP directory binding.
//!
//! The broker does not speak LDAP itself. It posts a bind request to a
//! directory bind service, which answers `200` with the identity on success
//! and `401`/`403` when the credentials are rejected.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vds_core::Identity;

use crate::directory::Directory;
use crate::error::{AuthError, Result};
use crate::DirectoryConfig;

/// Request payload for a directory bind.
#[derive(Debug, Clone, Serialize)]
pub struct BindRequest {
    /// User principal (`<user>@<domain>`).
    pub username: String,
    /// User's password.
    pub password: String,
    /// Search base derived from the domain.
    pub base_dn: String,
}

/// Raw response from the bind endpoint.
#[derive(Debug, Default, Deserialize)]
struct RawBindResponse {
    #[serde(default)]
    identity: Option<String>,
}

/// Directory client that binds over HTTP.
pub struct HttpDirectoryClient {
    config: DirectoryConfig,
    client: reqwest::Client,
}

impl HttpDirectoryClient {
    /// Create a new directory client with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should never happen with default TLS).
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to create HTTP client");

        Self { config, client }
    }

    /// The configuration this client binds with.
    #[must_use]
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    async fn handle_response(&self, username: &str, response: reqwest::Response) -> Result<Identity> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| {
                AuthError::DirectoryUnavailable(format!("failed to read bind response: {e}"))
            })?;
            let raw = decode_bind_response(&body);
            let identity = raw.identity.unwrap_or_else(|| username.to_string());
            return Identity::new(identity).map_err(|e| {
                AuthError::DirectoryUnavailable(format!("invalid identity in response: {e}"))
            });
        }

        match status.as_u16() {
            401 | 403 => Err(AuthError::InvalidCredentials(format!(
                "user={username}"
            ))),
            _ => Err(AuthError::DirectoryUnavailable(format!("HTTP {status}"))),
        }
    }
}

/// Decode a successful bind answer. An empty body carries no identity; an
/// unparseable one is logged and treated the same way.
fn decode_bind_response(body: &[u8]) -> RawBindResponse {
    if body.iter().all(u8::is_ascii_whitespace) {
        return RawBindResponse::default();
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Directory bind response did not parse, using submitted username");
        RawBindResponse::default()
    })
}

#[async_trait]
impl Directory for HttpDirectoryClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        // An empty password would be an anonymous bind on most directories.
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "empty username or password".to_string(),
            ));
        }

        let req = BindRequest {
            username: self.config.user_principal(username),
            password: password.to_string(),
            base_dn: self.config.base_dn(),
        };

        tracing::debug!(
            principal = %req.username,
            base_dn = %req.base_dn,
            "Binding to directory"
        );

        let response = self
            .client
            .post(self.config.bind_url())
            .json(&req)
            .send()
            .await
            .map_err(|e| AuthError::DirectoryUnavailable(format!("request failed: {e}")))?;

        self.handle_response(username, response).await
    }
}
