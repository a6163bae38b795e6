//! In-memory hypervisor for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use vds_core::VmId;

use crate::client::HypervisorClient;
use crate::error::{HypervisorError, Result};
use crate::types::{
    Credentials, GuestMetrics, PowerState, SessionRef, VmRecord, VmRef, OWNER_FIELD,
};

const SESSION: &str = "OpaqueRef:fake-session";

/// A VM held by [`InMemoryHypervisor`].
#[derive(Debug, Clone)]
pub struct FakeVm {
    /// VM uuid.
    pub uuid: String,
    /// Human-readable name.
    pub name: String,
    /// Current power state.
    pub power_state: PowerState,
    /// Owner tag, if set.
    pub owner: Option<String>,
    /// Guest metrics, if the guest tools reported.
    pub metrics: Option<GuestMetrics>,
}

impl FakeVm {
    /// A halted VM owned by `owner`, without guest metrics.
    #[must_use]
    pub fn new(uuid: &str, name: &str, owner: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
            power_state: PowerState::Halted,
            owner: Some(owner.to_string()),
            metrics: None,
        }
    }

    /// Set the power state.
    #[must_use]
    pub fn with_power_state(mut self, state: PowerState) -> Self {
        self.power_state = state;
        self
    }

    /// Set guest metrics.
    #[must_use]
    pub fn with_metrics(mut self, ip: &str, distro: &str) -> Self {
        let mut os = BTreeMap::new();
        os.insert("distro".to_string(), distro.to_string());
        self.metrics = Some(GuestMetrics {
            ip: ip.to_string(),
            os,
        });
        self
    }

    /// Remove the owner tag.
    #[must_use]
    pub fn without_owner(mut self) -> Self {
        self.owner = None;
        self
    }

    fn vm_ref(&self) -> VmRef {
        VmRef::new(format!("OpaqueRef:{}", self.uuid))
    }
}

/// A hypervisor that keeps its VMs in memory and counts every call.
#[derive(Debug)]
pub struct InMemoryHypervisor {
    credentials: Credentials,
    vms: RwLock<Vec<FakeVm>>,
    calls: AtomicUsize,
    offline: bool,
}

impl InMemoryHypervisor {
    /// Create a hypervisor accepting `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            vms: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
            offline: false,
        }
    }

    /// Create a hypervisor that fails every call with a transport error.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new(Credentials::new("root", ""))
        }
    }

    /// Add a VM.
    #[must_use]
    pub fn with_vm(self, vm: FakeVm) -> Self {
        self.vms.write().push(vm);
        self
    }

    /// Number of backend calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Current power state of a VM.
    #[must_use]
    pub fn power_state(&self, uuid: &str) -> Option<PowerState> {
        self.vms
            .read()
            .iter()
            .find(|vm| vm.uuid == uuid)
            .map(|vm| vm.power_state.clone())
    }

    fn enter(&self, session: Option<&SessionRef>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(HypervisorError::Transport(
                "connection refused".to_string(),
            ));
        }
        match session {
            Some(s) if s.as_str() != SESSION => Err(HypervisorError::Rpc {
                method: "session".to_string(),
                code: "SESSION_INVALID".to_string(),
                details: vec![s.as_str().to_string()],
            }),
            _ => Ok(()),
        }
    }

    fn with_vm_ref<T>(&self, vm: &VmRef, f: impl FnOnce(&mut FakeVm) -> Result<T>) -> Result<T> {
        let mut vms = self.vms.write();
        let found = vms
            .iter_mut()
            .find(|v| v.vm_ref() == *vm)
            .ok_or_else(|| HypervisorError::Rpc {
                method: "VM".to_string(),
                code: "HANDLE_INVALID".to_string(),
                details: vec!["VM".to_string(), vm.as_str().to_string()],
            })?;
        f(found)
    }
}

#[async_trait]
impl HypervisorClient for InMemoryHypervisor {
    async fn login_with_password(&self, credentials: &Credentials) -> Result<SessionRef> {
        self.enter(None)?;
        if credentials.username != self.credentials.username
            || credentials.password != self.credentials.password
        {
            return Err(HypervisorError::AuthenticationFailed(
                credentials.username.clone(),
            ));
        }
        Ok(SessionRef::new(SESSION))
    }

    async fn get_all(&self, session: &SessionRef) -> Result<Vec<VmRef>> {
        self.enter(Some(session))?;
        Ok(self.vms.read().iter().map(FakeVm::vm_ref).collect())
    }

    async fn get_other_config(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<HashMap<String, String>> {
        self.enter(Some(session))?;
        self.with_vm_ref(vm, |v| {
            let mut config = HashMap::new();
            if let Some(owner) = &v.owner {
                config.insert(OWNER_FIELD.to_string(), owner.clone());
            }
            Ok(config)
        })
    }

    async fn get_record(&self, session: &SessionRef, vm: &VmRef) -> Result<VmRecord> {
        self.enter(Some(session))?;
        self.with_vm_ref(vm, |v| {
            Ok(VmRecord {
                uuid: v.uuid.clone(),
                name_label: v.name.clone(),
                power_state: v.power_state.to_string(),
            })
        })
    }

    async fn get_guest_metrics(
        &self,
        session: &SessionRef,
        vm: &VmRef,
    ) -> Result<Option<GuestMetrics>> {
        self.enter(Some(session))?;
        self.with_vm_ref(vm, |v| Ok(v.metrics.clone()))
    }

    async fn get_by_uuid(&self, session: &SessionRef, uuid: &VmId) -> Result<VmRef> {
        self.enter(Some(session))?;
        self.vms
            .read()
            .iter()
            .find(|v| v.uuid == uuid.as_str())
            .map(FakeVm::vm_ref)
            .ok_or_else(|| HypervisorError::UnknownVm(uuid.to_string()))
    }

    async fn start(&self, session: &SessionRef, vm: &VmRef) -> Result<()> {
        self.enter(Some(session))?;
        self.with_vm_ref(vm, |v| {
            if v.power_state != PowerState::Halted {
                return Err(HypervisorError::BadPowerState(v.uuid.clone()));
            }
            v.power_state = PowerState::Running;
            Ok(())
        })
    }

    async fn shutdown(&self, session: &SessionRef, vm: &VmRef) -> Result<()> {
        self.enter(Some(session))?;
        self.with_vm_ref(vm, |v| {
            if v.power_state != PowerState::Running {
                return Err(HypervisorError::BadPowerState(v.uuid.clone()));
            }
            v.power_state = PowerState::Halted;
            Ok(())
        })
    }
}
