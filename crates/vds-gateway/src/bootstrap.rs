//! Bootstrap failover.
//!
//! Runs once at startup. If every backend initializes, the live route table
//! is installed; otherwise the failsafe table answers every route with
//! "out of service" for the life of the process.

use std::sync::Arc;

use vds_auth::{Directory, DirectoryConfig, TokenService};
use vds_core::BrokerError;
use vds_hypervisor::{HypervisorClient, SessionGuard};

use crate::config::BrokerConfig;
use crate::routes::RouteTable;
use crate::state::BrokerState;

/// Initialize the backends and install the matching route table.
///
/// `make_directory` builds the directory client from the derived directory
/// configuration; it does no I/O. The hypervisor session is logged in here.
pub async fn install<D, C, F>(
    config: &BrokerConfig,
    make_directory: F,
    guard: Arc<SessionGuard<C>>,
    tokens: Arc<TokenService>,
) -> RouteTable
where
    D: Directory + 'static,
    C: HypervisorClient + 'static,
    F: FnOnce(DirectoryConfig) -> D,
{
    let table = match init_backends(config, make_directory, guard, tokens).await {
        Ok(state) => RouteTable::live(state),
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Backend initialization failed");
            RouteTable::failsafe()
        }
    };

    tracing::info!(mode = %table.mode(), "Route table installed");
    table
}

async fn init_backends<D, C, F>(
    config: &BrokerConfig,
    make_directory: F,
    guard: Arc<SessionGuard<C>>,
    tokens: Arc<TokenService>,
) -> Result<Arc<BrokerState<D, C>>, BrokerError>
where
    D: Directory,
    C: HypervisorClient,
    F: FnOnce(DirectoryConfig) -> D,
{
    let directory_config =
        DirectoryConfig::new(config.directory_url.as_str(), config.directory_domain.as_str())?;
    tracing::debug!(
        domain = %directory_config.domain(),
        base_dn = %directory_config.base_dn(),
        "Directory configured"
    );
    let directory = make_directory(directory_config);

    guard.login(&config.hypervisor_credentials).await?;
    tracing::info!(url = %config.hypervisor_url, "Hypervisor session established");

    Ok(Arc::new(BrokerState::new(
        directory,
        tokens,
        guard,
        config.gateway.clone(),
    )))
}
