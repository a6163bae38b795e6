//! Connect endpoint.
//!
//! Checks that the caller owns the desktop, powers it on if it is halted and
//! returns the address a remote desktop client should connect to.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use vds_auth::Directory;
use vds_core::{BrokerError, VmId};
use vds_hypervisor::{HypervisorClient, HypervisorError, PowerState};

use super::Handler;
use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};
use crate::state::BrokerState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Connect request document. The token is consumed by the auth stage.
#[derive(Debug, Deserialize)]
pub struct ConnectBody {
    /// Desktop to connect to.
    pub vm_id: VmId,
}

/// Where to point the remote desktop client.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RdpEndpoint {
    /// Guest address, empty until the guest tools report one.
    pub rdp_ip: String,
    /// RDP port.
    pub rdp_port: u16,
}

// =============================================================================
// Handler
// =============================================================================

/// `POST /connect`
pub struct Connect<D: Directory, C: HypervisorClient> {
    state: Arc<BrokerState<D, C>>,
}

impl<D: Directory, C: HypervisorClient> Connect<D, C> {
    /// Create the handler.
    #[must_use]
    pub const fn new(state: Arc<BrokerState<D, C>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl<D, C> Handler for Connect<D, C>
where
    D: Directory + 'static,
    C: HypervisorClient + 'static,
{
    async fn handle(&self, ctx: &RequestContext) -> Result<Reply, ApiError> {
        let body: ConnectBody = ctx.parse_body()?;
        let identity = ctx.identity()?;
        let guard = &self.state.guard;

        let info = guard.get_info(&body.vm_id).await.map_err(|e| match e {
            HypervisorError::UnknownVm(_) => {
                tracing::debug!(vm_id = %body.vm_id, "Unknown desktop");
                ApiError::BadRequest("Unknown virtual desktop".to_string())
            }
            other => other.into(),
        })?;

        if !info.is_owned_by(identity.as_str()) {
            return Err(BrokerError::AuthFailure(format!(
                "{identity} does not own vm {}",
                body.vm_id
            ))
            .into());
        }

        if info.power_state == PowerState::Halted {
            match guard.start(&body.vm_id).await {
                Ok(()) => tracing::info!(vm_id = %body.vm_id, identity = %identity, "Started desktop"),
                Err(e) if e.is_not_applicable() => {
                    tracing::warn!(vm_id = %body.vm_id, error = %e, "Desktop not started");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let endpoint = RdpEndpoint {
            rdp_ip: info.ip,
            rdp_port: self.state.config.rdp_port,
        };
        let endpoint = serde_json::to_value(endpoint)
            .map_err(|e| BrokerError::MalformedInput(e.to_string()))?;

        let mut response = Map::new();
        response.insert(body.vm_id.to_string(), endpoint);
        Ok(Reply::ok(Value::Object(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use axum::http::StatusCode;
    use serde_json::json;
    use vds_core::Identity;

    fn ctx(identity: &str, body: Value) -> RequestContext {
        RequestContext {
            body: Some(body),
            identity: Some(Identity::new(identity).unwrap()),
            ..RequestContext::default()
        }
    }

    #[tokio::test]
    async fn connect_starts_halted_desktop() {
        let state = testing::state().await;
        let connect = Connect::new(Arc::clone(&state));

        let reply = connect
            .handle(&ctx("alice", json!({ "vm_id": "abc" })))
            .await
            .unwrap();

        assert_eq!(
            reply.body,
            Some(json!({ "abc": { "rdp_ip": "10.0.0.11", "rdp_port": 3389 } }))
        );
        assert_eq!(
            state.guard.client().power_state("abc"),
            Some(PowerState::Running)
        );
    }

    #[tokio::test]
    async fn connect_running_desktop_leaves_it_running() {
        let state = testing::state().await;
        let connect = Connect::new(Arc::clone(&state));

        let reply = connect
            .handle(&ctx("alice", json!({ "vm_id": "def" })))
            .await
            .unwrap();

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(
            state.guard.client().power_state("def"),
            Some(PowerState::Running)
        );
    }

    #[tokio::test]
    async fn connect_to_foreign_desktop_is_unauthorized() {
        let state = testing::state().await;
        let connect = Connect::new(Arc::clone(&state));

        let err = connect
            .handle(&ctx("alice", json!({ "vm_id": "xyz" })))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            state.guard.client().power_state("xyz"),
            Some(PowerState::Halted)
        );
    }

    #[tokio::test]
    async fn connect_unknown_desktop_is_bad_request() {
        let connect = Connect::new(testing::state().await);
        let err = connect
            .handle(&ctx("alice", json!({ "vm_id": "nope" })))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body(), json!({ "err": "Unknown virtual desktop" }));
    }

    #[tokio::test]
    async fn connect_requires_vm_id() {
        let connect = Connect::new(testing::state().await);
        let err = connect
            .handle(&ctx("alice", json!({ "vm_id": "" })))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
