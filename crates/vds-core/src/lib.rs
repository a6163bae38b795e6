//! Core types for the VDS broker.
//!
//! This crate provides the foundational types shared by every other crate:
//!
//! - **Identifiers**: `Identity`, `VmId`, and `CorrelationId`
//! - **Error taxonomy**: the closed set of domain failures, `BrokerError`
//!
//! # Example
//!
//! ```
//! use vds_core::{BrokerError, CorrelationId, Identity, VmId};
//!
//! let identity = Identity::new("alice").unwrap();
//! let vm = VmId::new("8d3c6f2e-7a51-4c0e-9a7e-1d2f3b4c5d6e").unwrap();
//! let correlation = CorrelationId::generate();
//!
//! let err = BrokerError::hypervisor_unavailable("connection refused");
//! assert_eq!(err.kind(), "backend_unavailable");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{Backend, BrokerError, Result};
pub use ids::{CorrelationId, IdError, Identity, VmId};
