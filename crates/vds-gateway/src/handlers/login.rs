//! Login endpoint.
//!
//! Authenticates the user at the directory, issues a token and lists the
//! desktops tagged as owned by the user.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use vds_auth::{Directory, Token};
use vds_core::BrokerError;
use vds_hypervisor::{HypervisorClient, VmInfo};

use super::Handler;
use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};
use crate::state::BrokerState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Login request document.
#[derive(Debug, Deserialize)]
pub struct LoginBody {
    /// Directory username.
    pub username: String,
    /// Directory password.
    pub password: String,
}

/// One desktop in the login response.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DesktopSummary {
    /// Human-readable name.
    pub name: String,
    /// Power state.
    pub status: String,
    /// Guest address, empty if unknown.
    pub public_ip: String,
    /// Guest distro, empty if unknown.
    pub os: String,
}

impl From<VmInfo> for DesktopSummary {
    fn from(info: VmInfo) -> Self {
        Self {
            os: info.os.get("distro").cloned().unwrap_or_default(),
            status: info.power_state.to_string(),
            public_ip: info.ip,
            name: info.name,
        }
    }
}

/// Login response document.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// The user's desktops by uuid.
    pub vms: BTreeMap<String, DesktopSummary>,
    /// Token for subsequent requests.
    pub token: Token,
}

// =============================================================================
// Handler
// =============================================================================

/// `POST /login`
pub struct Login<D: Directory, C: HypervisorClient> {
    state: Arc<BrokerState<D, C>>,
}

impl<D: Directory, C: HypervisorClient> Login<D, C> {
    /// Create the handler.
    #[must_use]
    pub const fn new(state: Arc<BrokerState<D, C>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl<D, C> Handler for Login<D, C>
where
    D: Directory + 'static,
    C: HypervisorClient + 'static,
{
    async fn handle(&self, ctx: &RequestContext) -> Result<Reply, ApiError> {
        let body: LoginBody = ctx.parse_body()?;

        let identity = self
            .state
            .directory
            .authenticate(&body.username, &body.password)
            .await?;

        let token = self.state.tokens.issue(identity.as_str());
        tracing::info!(
            identity = %identity,
            ttl_seconds = self.state.tokens.ttl().as_secs(),
            "Issued token"
        );

        let desktops: Vec<VmInfo> = self
            .state
            .guard
            .list_by_owner(&identity)
            .try_collect()
            .await?;

        tracing::debug!(identity = %identity, count = desktops.len(), "Listed desktops");

        let response = LoginResponse {
            vms: desktops
                .into_iter()
                .map(|info| (info.uuid.clone(), DesktopSummary::from(info)))
                .collect(),
            token,
        };

        let body = serde_json::to_value(response)
            .map_err(|e| BrokerError::MalformedInput(e.to_string()))?;
        Ok(Reply::ok(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    fn ctx(body: Value) -> RequestContext {
        RequestContext {
            body: Some(body),
            ..RequestContext::default()
        }
    }

    #[tokio::test]
    async fn login_lists_owned_desktops() {
        let state = testing::state().await;
        let login = Login::new(Arc::clone(&state));

        let reply = login
            .handle(&ctx(json!({ "username": "alice", "password": "wonderland" })))
            .await
            .unwrap();
        let body = reply.body.unwrap();

        assert_eq!(
            body["vms"],
            json!({
                "abc": {
                    "name": "Alice desktop",
                    "status": "Halted",
                    "public_ip": "10.0.0.11",
                    "os": "centos",
                },
                "def": {
                    "name": "Alice lab",
                    "status": "Running",
                    "public_ip": "10.0.0.12",
                    "os": "ubuntu",
                },
            })
        );

        let token = body["token"].as_str().unwrap();
        assert_eq!(state.tokens.verify(token).unwrap(), "alice");
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let login = Login::new(testing::state().await);
        let err = login
            .handle(&ctx(json!({ "username": "alice", "password": "nope" })))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.body(), json!({ "err": "Invalid username or password" }));
    }

    #[tokio::test]
    async fn login_requires_credentials_fields() {
        let login = Login::new(testing::state().await);
        let err = login
            .handle(&ctx(json!({ "username": "alice" })))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
