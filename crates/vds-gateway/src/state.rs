//! Broker application state.
//!
//! This module defines the shared state handed to the live route handlers.

use std::sync::Arc;

use vds_auth::{Directory, TokenService};
use vds_hypervisor::{HypervisorClient, SessionGuard};

use crate::config::GatewayConfig;

/// Shared application state for the live handlers.
///
/// Only built once the backends initialized, so every handler may assume an
/// authenticated hypervisor session.
pub struct BrokerState<D, C>
where
    D: Directory,
    C: HypervisorClient,
{
    /// The directory users authenticate against.
    pub directory: D,
    /// Issues and verifies session tokens.
    pub tokens: Arc<TokenService>,
    /// The authenticated hypervisor session.
    pub guard: Arc<SessionGuard<C>>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<D, C> BrokerState<D, C>
where
    D: Directory,
    C: HypervisorClient,
{
    /// Create a new broker state.
    #[must_use]
    pub fn new(
        directory: D,
        tokens: Arc<TokenService>,
        guard: Arc<SessionGuard<C>>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            directory,
            tokens,
            guard,
            config,
        }
    }
}
