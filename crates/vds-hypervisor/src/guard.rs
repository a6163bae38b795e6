//! External session guard.
//!
//! `SessionGuard` owns the hypervisor session for the whole process. It starts
//! unauthenticated; `login` performs the handshake once, and every other
//! operation fails with `HypervisorError::NotAuthenticated` until then,
//! without touching the backend.
//!
//! The session reference lives in a `OnceLock`, so readiness moves from false
//! to true exactly once and is read lock-free afterwards. The guard does not
//! serialize calls: the underlying client pools connections, and one XAPI
//! session is valid across all of them.

use std::collections::HashMap;
use std::sync::OnceLock;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use vds_core::{Identity, VmId};

use crate::client::HypervisorClient;
use crate::error::{HypervisorError, Result};
use crate::types::{Credentials, PowerState, SessionRef, VmInfo, VmRef, OWNER_FIELD};

/// Guards a hypervisor client behind a one-time login.
pub struct SessionGuard<C: HypervisorClient> {
    client: C,
    session: OnceLock<SessionRef>,
}

impl<C: HypervisorClient> SessionGuard<C> {
    /// Wrap a client. The guard starts unauthenticated.
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self {
            client,
            session: OnceLock::new(),
        }
    }

    /// Returns `true` once `login` has succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.session.get().is_some()
    }

    /// The wrapped client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Perform the session handshake.
    ///
    /// Logging in on a guard that is already ready does nothing.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::AuthenticationFailed` if the hypervisor rejects
    /// the credentials, or a transport/RPC error if it cannot be reached.
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        if self.is_ready() {
            tracing::debug!("Hypervisor session already established, ignoring login");
            return Ok(());
        }

        let session = self.client.login_with_password(credentials).await?;
        if self.session.set(session).is_err() {
            tracing::debug!("Concurrent hypervisor login won the race, keeping first session");
        }

        tracing::info!(username = %credentials.username, "Hypervisor session established");
        Ok(())
    }

    fn session(&self) -> Result<&SessionRef> {
        self.session.get().ok_or(HypervisorError::NotAuthenticated)
    }

    /// Lazily enumerate the VMs tagged as owned by `owner`.
    ///
    /// VMs are fetched one at a time as the stream is polled. A guard that is
    /// not ready yields a single `NotAuthenticated` error.
    pub fn list_by_owner<'a>(&'a self, owner: &'a Identity) -> BoxStream<'a, Result<VmInfo>> {
        let session = match self.session() {
            Ok(session) => session,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        stream::once(self.client.get_all(session))
            .map_ok(|refs| stream::iter(refs.into_iter().map(Ok::<_, HypervisorError>)))
            .try_flatten()
            .try_filter_map(move |vm| async move { self.owned_info(session, &vm, owner).await })
            .boxed()
    }

    async fn owned_info(
        &self,
        session: &SessionRef,
        vm: &VmRef,
        owner: &Identity,
    ) -> Result<Option<VmInfo>> {
        let other_config = self.client.get_other_config(session, vm).await?;
        match other_config.get(OWNER_FIELD) {
            Some(tag) if tag == owner.as_str() => {
                self.describe(session, vm, other_config).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Get information about one VM.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::UnknownVm` if no VM has this uuid.
    pub async fn get_info(&self, vm_id: &VmId) -> Result<VmInfo> {
        let session = self.session()?;
        let vm = self.client.get_by_uuid(session, vm_id).await?;
        let other_config = self.client.get_other_config(session, &vm).await?;
        self.describe(session, &vm, other_config).await
    }

    /// Start a halted VM.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::BadPowerState` if the VM is not halted.
    pub async fn start(&self, vm_id: &VmId) -> Result<()> {
        let session = self.session()?;
        let vm = self.client.get_by_uuid(session, vm_id).await?;
        self.client.start(session, &vm).await?;
        tracing::info!(vm_id = %vm_id, "VM started");
        Ok(())
    }

    /// Shut down a running VM.
    ///
    /// # Errors
    ///
    /// Returns `HypervisorError::BadPowerState` if the VM is not running.
    pub async fn shutdown(&self, vm_id: &VmId) -> Result<()> {
        let session = self.session()?;
        let vm = self.client.get_by_uuid(session, vm_id).await?;
        self.client.shutdown(session, &vm).await?;
        tracing::info!(vm_id = %vm_id, "VM shut down");
        Ok(())
    }

    async fn describe(
        &self,
        session: &SessionRef,
        vm: &VmRef,
        mut other_config: HashMap<String, String>,
    ) -> Result<VmInfo> {
        let record = self.client.get_record(session, vm).await?;
        let metrics = self
            .client
            .get_guest_metrics(session, vm)
            .await?
            .unwrap_or_default();

        Ok(VmInfo {
            power_state: PowerState::from(record.power_state.as_str()),
            uuid: record.uuid,
            name: record.name_label,
            ip: metrics.ip,
            os: metrics.os,
            owner: other_config.remove(OWNER_FIELD),
        })
    }
}
