//! Hypervisor binding for the VDS broker.
//!
//! This crate provides access to the virtual desktops hosted on the
//! hypervisor pool:
//!
//! - **`HypervisorClient`**: the raw call surface, with an XAPI JSON-RPC
//!   implementation in [`XapiClient`]
//! - **`SessionGuard`**: the process-wide session that refuses every operation
//!   until the broker has logged in
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway handlers                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SessionGuard                          │
//! │   ready? ──no──▶ NotAuthenticated (no backend call)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ yes
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              HypervisorClient (XapiClient)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ JSON-RPC
//!                              ▼
//!                        Pool master
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use vds_core::{Identity, VmId};
//! use vds_hypervisor::{Credentials, SessionGuard, XapiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let guard = SessionGuard::new(XapiClient::new("http://10.0.0.2"));
//! guard.login(&Credentials::new("root", "secret")).await?;
//!
//! let alice = Identity::new("alice")?;
//! let desktops: Vec<_> = guard.list_by_owner(&alice).try_collect().await?;
//! println!("alice owns {} desktops", desktops.len());
//!
//! guard.start(&VmId::new("8d3c6f2e-7a51-4c0e-9a7e-1d2f3b4c5d6e")?).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod error;
pub mod guard;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use client::{HypervisorClient, XapiClient};
pub use error::{HypervisorError, Result};
pub use guard::SessionGuard;
pub use types::{
    Credentials, GuestMetrics, PowerState, SessionRef, VmInfo, VmRecord, VmRef, OWNER_FIELD,
};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::{FakeVm, InMemoryHypervisor};
