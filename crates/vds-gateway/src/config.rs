//! Gateway configuration types.
//!
//! `GatewayConfig` holds the HTTP-facing settings; `BrokerConfig` adds the
//! backend endpoints and secrets and is what the binary loads from the
//! environment.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use vds_hypervisor::Credentials;

use crate::routes::Route;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Prefix every route is mounted under.
    #[serde(default = "GatewayConfig::default_route_prefix")]
    pub route_prefix: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// RDP port reported to clients by `connect`.
    #[serde(default = "GatewayConfig::default_rdp_port")]
    pub rdp_port: u16,

    /// Routes reachable without a token. The liveness route is always exempt.
    #[serde(default = "GatewayConfig::default_auth_exempt")]
    pub auth_exempt: HashSet<Route>,

    /// Client-visible settings served by the `settings` route.
    #[serde(default = "GatewayConfig::default_settings")]
    pub settings: BTreeMap<String, Value>,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_route_prefix() -> String {
        "/v1".to_string()
    }

    const fn default_max_body() -> usize {
        64 * 1024 // 64 KB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_rdp_port() -> u16 {
        3389
    }

    fn default_auth_exempt() -> HashSet<Route> {
        [Route::Login, Route::Settings, Route::Heartbeat]
            .into_iter()
            .collect()
    }

    fn default_settings() -> BTreeMap<String, Value> {
        BTreeMap::from([("otp".to_string(), Value::Bool(false))])
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            route_prefix: Self::default_route_prefix(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            rdp_port: Self::default_rdp_port(),
            auth_exempt: Self::default_auth_exempt(),
            settings: Self::default_settings(),
        }
    }
}

/// An environment variable held a value that could not be used.
#[derive(Debug, Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    /// The offending variable.
    pub var: &'static str,
    /// Why it was rejected.
    pub reason: String,
}

/// Full broker configuration: gateway settings plus backend endpoints.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// HTTP-facing settings.
    pub gateway: GatewayConfig,
    /// Token key material. `None` means an ephemeral key is generated.
    pub token_secret: Option<String>,
    /// Hypervisor pool master URL.
    pub hypervisor_url: String,
    /// Credentials the broker logs in to the hypervisor with.
    pub hypervisor_credentials: Credentials,
    /// Directory bind service URL.
    pub directory_url: String,
    /// Directory domain (e.g. `corp.example.com`).
    pub directory_domain: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            token_secret: None,
            hypervisor_url: "http://127.0.0.1".to_string(),
            hypervisor_credentials: Credentials::new("root", ""),
            directory_url: "http://127.0.0.1:8389".to_string(),
            directory_domain: String::new(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.gateway.listen_addr = addr;
        }
        if let Some(prefix) = lookup("VDS_ROUTE_PREFIX") {
            config.gateway.route_prefix = normalize_prefix(&prefix);
        }
        if let Some(port) = lookup("VDS_RDP_PORT") {
            config.gateway.rdp_port = port.trim().parse().map_err(|e| ConfigError {
                var: "VDS_RDP_PORT",
                reason: format!("{e}"),
            })?;
        }

        config.token_secret = lookup("VDS_TOKEN_SECRET").filter(|s| !s.trim().is_empty());

        if let Some(url) = lookup("VDS_XAPI_URL") {
            config.hypervisor_url = url;
        }
        if let Some(username) = lookup("VDS_XAPI_USERNAME") {
            config.hypervisor_credentials.username = username;
        }
        if let Some(password) = lookup("VDS_XAPI_PASSWORD") {
            config.hypervisor_credentials.password = password;
        }
        if let Some(url) = lookup("VDS_DIRECTORY_URL") {
            config.directory_url = url;
        }
        if let Some(domain) = lookup("VDS_DIRECTORY_DOMAIN") {
            config.directory_domain = domain;
        }

        Ok(config)
    }
}

/// Ensure a route prefix starts with `/` and has no trailing `/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
