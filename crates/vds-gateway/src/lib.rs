//! HTTP gateway for the VDS broker.
//!
//! This crate is the client-facing half of the broker. It handles:
//!
//! - Request pipeline: content-type check, JSON body parsing, audit logging
//!   and token verification ahead of every route handler
//! - Route handlers for login, connect, settings and the liveness probe
//! - Error translation from domain failures to client responses
//! - Bootstrap failover between the live and the failsafe route table
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                     (HTTP + JSON)                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       vds-gateway                           │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Pipeline   │ │ Route table │ │     Translator      │    │
//! │  │  (stages)   │ │ + Handlers  │ │ (BrokerError → API) │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐             ┌──────────────┐
//!        │  Directory   │             │  Hypervisor  │
//!        │  (vds-auth)  │             │ (session     │
//!        │              │             │  guard)      │
//!        └──────────────┘             └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use vds_auth::{HttpDirectoryClient, TokenService};
//! use vds_gateway::{bootstrap, create_router, BrokerConfig};
//! use vds_hypervisor::{SessionGuard, XapiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig::from_env()?;
//! let tokens = Arc::new(TokenService::generate());
//! let guard = Arc::new(SessionGuard::new(XapiClient::new(config.hypervisor_url.clone())));
//!
//! let table = bootstrap::install(&config, HttpDirectoryClient::new, guard, Arc::clone(&tokens)).await;
//! let app = create_router(table, tokens, &config.gateway);
//!
//! let listener = tokio::net::TcpListener::bind(&config.gateway.listen_addr).await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod routes;
pub mod state;

pub use config::{BrokerConfig, ConfigError, GatewayConfig};
pub use error::{translate, ApiError};
pub use pipeline::{Pipeline, Stage};
pub use routes::{create_router, Mode, Route, RouteTable};
pub use state::BrokerState;
