//! Hypervisor management API client.
//!
//! `HypervisorClient` is the raw, unguarded call surface; `XapiClient` speaks
//! XAPI JSON-RPC over HTTP. Callers normally go through
//! [`SessionGuard`](crate::SessionGuard), which owns the session reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vds_core::VmId;

use crate::error::{HypervisorError, Result};
use crate::types::{Credentials, GuestMetrics, SessionRef, VmRecord, VmRef, NULL_REF};

/// Raw hypervisor operations.
///
/// This trait abstracts the backend wire protocol, allowing for in-memory
/// implementations in tests.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Log in and obtain a session reference.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::AuthenticationFailed` if the credentials are
    /// rejected, or another error if the call fails.
    async fn login_with_password(&self, credentials: &Credentials) -> Result<SessionRef>;

    /// List references to every VM.
    async fn get_all(&self, session: &SessionRef) -> Result<Vec<VmRef>>;

    /// Get a VM's `other_config` map.
    async fn get_other_config(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<HashMap<String, String>>;

    /// Get a VM's record.
    async fn get_record(&self, session: &SessionRef, vm: &VmRef) -> Result<VmRecord>;

    /// Get a VM's guest metrics, or `None` if the guest tools never reported.
    async fn get_guest_metrics(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<Option<GuestMetrics>>;

    /// Resolve a VM uuid to a reference.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::UnknownVm` if no VM has this uuid.
    async fn get_by_uuid(&self, session: &SessionRef, uuid: &VmId) -> Result<VmRef>;

    /// Start a halted VM.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::BadPowerState` if the VM is not halted.
    async fn start(&self, session: &SessionRef, vm: &VmRef) -> Result<()>;

    /// Shut down a running VM.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::BadPowerState` if the VM is not running.
    async fn shutdown(&self, session: &SessionRef, vm: &VmRef) -> Result<()>;
}

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFailure>,
}

/// A failure reported by XAPI: a code plus string parameters.
#[derive(Debug, Deserialize)]
struct RpcFailure {
    message: String,
    #[serde(default)]
    data: Vec<Value>,
}

/// Guest metrics record, as returned by `VM_guest_metrics.get_record`.
#[derive(Debug, Default, Deserialize)]
struct RawGuestMetrics {
    #[serde(default)]
    networks: HashMap<String, String>,
    #[serde(default)]
    os_version: std::collections::BTreeMap<String, String>,
}

/// XAPI JSON-RPC client.
#[derive(Debug)]
pub struct XapiClient {
    client: reqwest::Client,
    base_url: String,
    next_id: AtomicU64,
}

impl XapiClient {
    /// Create a new XAPI client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the pool master (e.g., "http://10.0.0.2")
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, base_url)
    }

    /// Create a new XAPI client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the base URL of the hypervisor.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(format!("{}/jsonrpc", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| HypervisorError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HypervisorError::Transport(format!(
                "{method}: hypervisor returned status {status}"
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| HypervisorError::Transport(format!("{method}: invalid response: {e}")))?;

        if let Some(failure) = body.error {
            return Err(classify_failure(method, failure));
        }

        serde_json::from_value(body.result.unwrap_or(Value::Null)).map_err(|e| {
            HypervisorError::Transport(format!("{method}: unexpected result: {e}"))
        })
    }

    async fn session_call<T: DeserializeOwned>(
        &self,
        method: &str,
        session: &SessionRef,
        args: impl IntoIterator<Item = Value> + Send,
    ) -> Result<T> {
        let mut params = vec![Value::from(session.as_str())];
        params.extend(args);
        self.call(method, params).await
    }

    /// Call a method whose result carries nothing. XAPI answers these with
    /// `""` as often as with `null`, so any result is accepted.
    async fn session_call_void(
        &self,
        method: &str,
        session: &SessionRef,
        args: impl IntoIterator<Item = Value> + Send,
    ) -> Result<()> {
        let _: IgnoredAny = self.session_call(method, session, args).await?;
        Ok(())
    }
}

/// Map an XAPI failure code to a typed error.
fn classify_failure(method: &str, failure: RpcFailure) -> HypervisorError {
    let details: Vec<String> = failure
        .data
        .iter()
        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
        .collect();
    let first = details.first().cloned().unwrap_or_default();

    match failure.message.as_str() {
        "SESSION_AUTHENTICATION_FAILED" => HypervisorError::AuthenticationFailed(first),
        "VM_BAD_POWER_STATE" => HypervisorError::BadPowerState(first),
        "UUID_INVALID" => HypervisorError::UnknownVm(details.last().cloned().unwrap_or(first)),
        code => HypervisorError::Rpc {
            method: method.to_string(),
            code: code.to_string(),
            details,
        },
    }
}

#[async_trait]
impl HypervisorClient for XapiClient {
    async fn login_with_password(&self, credentials: &Credentials) -> Result<SessionRef> {
        let session: String = self
            .call(
                "session.login_with_password",
                vec![
                    Value::from(credentials.username.as_str()),
                    Value::from(credentials.password.as_str()),
                ],
            )
            .await?;
        Ok(SessionRef::new(session))
    }

    async fn get_all(&self, session: &SessionRef) -> Result<Vec<VmRef>> {
        self.session_call("VM.get_all", session, []).await
    }

    async fn get_other_config(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<HashMap<String, String>> {
        self.session_call("VM.get_other_config", session, [Value::from(vm.as_str())])
            .await
    }

    async fn get_record(&self, session: &SessionRef, vm: &VmRef) -> Result<VmRecord> {
        self.session_call("VM.get_record", session, [Value::from(vm.as_str())])
            .await
    }

    async fn get_guest_metrics(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<Option<GuestMetrics>> {
        let metrics_ref: String = self
            .session_call("VM.get_guest_metrics", session, [Value::from(vm.as_str())])
            .await?;

        if metrics_ref == NULL_REF {
            return Ok(None);
        }

        let raw: RawGuestMetrics = self
            .session_call(
                "VM_guest_metrics.get_record",
                session,
                [Value::from(metrics_ref)],
            )
            .await?;

        Ok(Some(GuestMetrics {
            ip: raw.networks.get("0/ip").cloned().unwrap_or_default(),
            os: raw.os_version,
        }))
    }

    async fn get_by_uuid(&self, session: &SessionRef, uuid: &VmId) -> Result<VmRef> {
        self.session_call("VM.get_by_uuid", session, [Value::from(uuid.as_str())])
            .await
    }

    async fn start(&self, session: &SessionRef, vm: &VmRef) -> Result<()> {
        // start_paused = false, force = true
        self.session_call_void(
            "VM.start",
            session,
            [Value::from(vm.as_str()), Value::Bool(false), Value::Bool(true)],
        )
        .await
    }

    async fn shutdown(&self, session: &SessionRef, vm: &VmRef) -> Result<()> {
        self.session_call_void("VM.shutdown", session, [Value::from(vm.as_str())])
            .await
    }
}
