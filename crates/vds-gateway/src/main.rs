//! VDS broker gateway.
//!
//! Reads its configuration from the environment, logs in to the hypervisor
//! and serves the broker API. If the backends cannot be initialized the
//! process keeps running in failsafe mode and answers every route with
//! "out of service".
//!
//! # Token key
//!
//! Set `VDS_TOKEN_SECRET` so tokens survive a restart and are accepted by
//! every broker instance. Without it an ephemeral key is generated.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vds_auth::{HttpDirectoryClient, TokenService};
use vds_gateway::{bootstrap, create_router, BrokerConfig};
use vds_hypervisor::{SessionGuard, XapiClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vds=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VDS broker gateway");

    let config = BrokerConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.gateway.listen_addr,
        route_prefix = %config.gateway.route_prefix,
        hypervisor_url = %config.hypervisor_url,
        directory_url = %config.directory_url,
        directory_domain = %config.directory_domain,
        "Broker configuration loaded"
    );

    let tokens = match config.token_secret.as_deref() {
        Some(secret) => Arc::new(TokenService::from_secret(secret)?),
        None => {
            tracing::warn!("No VDS_TOKEN_SECRET set - tokens will not survive a restart");
            Arc::new(TokenService::generate())
        }
    };

    let guard = Arc::new(SessionGuard::new(XapiClient::new(
        config.hypervisor_url.clone(),
    )));

    let table = bootstrap::install(
        &config,
        HttpDirectoryClient::new,
        guard,
        Arc::clone(&tokens),
    )
    .await;

    let app = create_router(table, tokens, &config.gateway);

    // Start HTTP server
    tracing::info!(listen_addr = %config.gateway.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.gateway.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
