//! Value types exchanged with the hypervisor.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Key in a VM's `other_config` that names the owning directory user.
pub const OWNER_FIELD: &str = "XenCenter.CustomFields.owner";

/// Reference returned for VMs without guest metrics.
pub const NULL_REF: &str = "OpaqueRef:NULL";

/// Credentials the broker uses to log in to the hypervisor.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Hypervisor username.
    pub username: String,
    /// Hypervisor password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated hypervisor session reference.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRef(String);

impl SessionRef {
    /// Wrap a session reference returned by the hypervisor.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionRef(<opaque>)")
    }
}

/// An opaque hypervisor object reference for a VM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmRef(String);

impl VmRef {
    /// Wrap an object reference returned by the hypervisor.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Power state of a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    /// The VM is running.
    Running,
    /// The VM is powered off.
    Halted,
    /// The VM is paused in memory.
    Paused,
    /// The VM is suspended to disk.
    Suspended,
    /// A state this broker does not know about.
    Unknown(String),
}

impl From<&str> for PowerState {
    fn from(s: &str) -> Self {
        match s {
            "Running" => Self::Running,
            "Halted" => Self::Halted,
            "Paused" => Self::Paused,
            "Suspended" => Self::Suspended,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl FromStr for PowerState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("Running"),
            Self::Halted => f.write_str("Halted"),
            Self::Paused => f.write_str("Paused"),
            Self::Suspended => f.write_str("Suspended"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// The subset of a VM record the broker reads.
#[derive(Debug, Clone, Deserialize)]
pub struct VmRecord {
    /// VM uuid.
    pub uuid: String,
    /// Human-readable name.
    pub name_label: String,
    /// Power state as reported by the hypervisor.
    pub power_state: String,
}

/// Guest agent metrics for a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestMetrics {
    /// First interface address, empty if the guest tools did not report one.
    pub ip: String,
    /// OS descriptor (distro, major, minor, name).
    pub os: BTreeMap<String, String>,
}

/// Everything the broker knows about one virtual desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInfo {
    /// VM uuid.
    pub uuid: String,
    /// Human-readable name.
    pub name: String,
    /// Power state.
    pub power_state: PowerState,
    /// Guest IP address, empty if unknown.
    pub ip: String,
    /// OS descriptor, empty if unknown.
    pub os: BTreeMap<String, String>,
    /// Owning directory user, from the VM's owner tag.
    pub owner: Option<String>,
}

impl VmInfo {
    /// Returns `true` if the VM is tagged as owned by `owner`.
    #[must_use]
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }
}
