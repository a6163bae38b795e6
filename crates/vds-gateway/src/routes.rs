//! Route table and router configuration.
//!
//! Routes are resolved by the pipeline rather than by axum's path router, so
//! the axum `Router` only carries the tower middleware and a single fallback
//! service that hands every request to [`Pipeline::process`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::Response;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use vds_auth::{Directory, TokenService};
use vds_hypervisor::HypervisorClient;

use crate::config::GatewayConfig;
use crate::handlers::{connect, failsafe, heartbeat, login, settings, Handler};
use crate::pipeline::Pipeline;
use crate::state::BrokerState;

/// A broker route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Authenticate and receive a token plus the desktop list.
    Login,
    /// Connect to (and if needed start) a desktop.
    Connect,
    /// Read client settings.
    Settings,
    /// Liveness probe.
    Heartbeat,
}

impl Route {
    /// Every route.
    pub const ALL: [Self; 4] = [Self::Login, Self::Connect, Self::Settings, Self::Heartbeat];

    /// Resolve a path segment. `conn` is accepted as an alias for `connect`.
    #[must_use]
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "login" => Some(Self::Login),
            "connect" | "conn" => Some(Self::Connect),
            "settings" => Some(Self::Settings),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// Canonical path segment.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Connect => "connect",
            Self::Settings => "settings",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Returns `true` for the body-less liveness route.
    #[must_use]
    pub const fn is_liveness(self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    /// Whether a live handler serves this method.
    #[must_use]
    pub fn allows(self, method: &Method) -> bool {
        *method == Method::POST
            || (self.is_liveness() && (*method == Method::GET || *method == Method::HEAD))
    }

    /// Resolve a request path under `prefix` (e.g. `/v1/login`).
    #[must_use]
    pub fn resolve(prefix: &str, path: &str) -> Option<Self> {
        let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
        Self::from_segment(rest.trim_end_matches('/'))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Which route table is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Real handlers backed by initialized backends.
    Live,
    /// Every route answers "out of service".
    Failsafe,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Failsafe => f.write_str("failsafe"),
        }
    }
}

/// Mapping from route to handler, plus the routes exempt from token checks.
pub struct RouteTable {
    mode: Mode,
    handlers: HashMap<Route, Arc<dyn Handler>>,
    exempt: HashSet<Route>,
}

impl RouteTable {
    /// Build the live table over initialized backends.
    #[must_use]
    pub fn live<D, C>(state: Arc<BrokerState<D, C>>) -> Self
    where
        D: Directory + 'static,
        C: HypervisorClient + 'static,
    {
        let mut exempt = state.config.auth_exempt.clone();
        exempt.insert(Route::Heartbeat);

        let handlers: HashMap<Route, Arc<dyn Handler>> = HashMap::from([
            (
                Route::Login,
                Arc::new(login::Login::new(Arc::clone(&state))) as Arc<dyn Handler>,
            ),
            (
                Route::Connect,
                Arc::new(connect::Connect::new(Arc::clone(&state))) as Arc<dyn Handler>,
            ),
            (
                Route::Settings,
                Arc::new(settings::Settings::new(state.config.settings.clone()))
                    as Arc<dyn Handler>,
            ),
            (
                Route::Heartbeat,
                Arc::new(heartbeat::Heartbeat) as Arc<dyn Handler>,
            ),
        ]);

        Self {
            mode: Mode::Live,
            handlers,
            exempt,
        }
    }

    /// Build the failsafe table: one out-of-service handler for every route.
    #[must_use]
    pub fn failsafe() -> Self {
        let handler: Arc<dyn Handler> = Arc::new(failsafe::OutOfService);
        Self {
            mode: Mode::Failsafe,
            handlers: Route::ALL
                .into_iter()
                .map(|route| (route, Arc::clone(&handler)))
                .collect(),
            exempt: Route::ALL.into_iter().collect(),
        }
    }

    /// Which table this is.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// The handler for a route.
    #[must_use]
    pub fn handler(&self, route: Route) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&route)
    }

    /// Routes reachable without a token.
    #[must_use]
    pub const fn exempt_routes(&self) -> &HashSet<Route> {
        &self.exempt
    }

    /// Returns `true` if the route does not require a token.
    #[must_use]
    pub fn is_exempt(&self, route: Route) -> bool {
        self.exempt.contains(&route)
    }

    /// Whether `method` is served on `route`. The failsafe table serves any.
    #[must_use]
    pub fn accepts(&self, route: Route, method: &Method) -> bool {
        match self.mode {
            Mode::Live => route.allows(method),
            Mode::Failsafe => true,
        }
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("mode", &self.mode)
            .field("routes", &self.handlers.keys().collect::<Vec<_>>())
            .field("exempt", &self.exempt)
            .finish()
    }
}

/// Create the broker router: the request pipeline behind the tower middleware.
pub fn create_router(table: RouteTable, tokens: Arc<TokenService>, config: &GatewayConfig) -> Router {
    let cors = build_cors_layer(&config.cors_origins);
    let pipeline = Arc::new(Pipeline::new(table, tokens, config));

    Router::new()
        .fallback(dispatch)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .with_state(pipeline)
}

async fn dispatch(State(pipeline): State<Arc<Pipeline>>, request: Request) -> Response {
    pipeline.process(request).await
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_routes() {
        assert_eq!(Route::resolve("/v1", "/v1/login"), Some(Route::Login));
        assert_eq!(Route::resolve("/v1", "/v1/conn"), Some(Route::Connect));
        assert_eq!(Route::resolve("/v1", "/v1/connect/"), Some(Route::Connect));
        assert_eq!(Route::resolve("/v1", "/v1/heartbeat"), Some(Route::Heartbeat));
        assert_eq!(Route::resolve("", "/settings"), Some(Route::Settings));
        assert_eq!(Route::resolve("/v1", "/login"), None);
        assert_eq!(Route::resolve("/v1", "/v1/logout"), None);
        assert_eq!(Route::resolve("/v1", "/v1login"), None);
        assert_eq!(Route::resolve("/v1", "/v1/login/extra"), None);
    }

    #[test]
    fn route_methods() {
        assert!(Route::Login.allows(&Method::POST));
        assert!(!Route::Login.allows(&Method::GET));
        assert!(Route::Heartbeat.allows(&Method::GET));
        assert!(!Route::Connect.allows(&Method::DELETE));
    }

    #[test]
    fn route_serde_lowercase() {
        let json = serde_json::to_string(&Route::Heartbeat).unwrap();
        assert_eq!(json, "\"heartbeat\"");
        let route: Route = serde_json::from_str("\"connect\"").unwrap();
        assert_eq!(route, Route::Connect);
    }

    #[test]
    fn failsafe_table_covers_every_route() {
        let table = RouteTable::failsafe();
        assert_eq!(table.mode(), Mode::Failsafe);
        for route in Route::ALL {
            assert!(table.handler(route).is_some());
            assert!(table.is_exempt(route));
            assert!(table.accepts(route, &Method::DELETE));
        }
    }

    #[tokio::test]
    async fn router_dispatches_through_pipeline() {
        use axum::body::Body;
        use axum::http::StatusCode;
        use tower::ServiceExt;

        let app = create_router(
            RouteTable::failsafe(),
            Arc::new(TokenService::generate()),
            &GatewayConfig::default(),
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let request = Request::builder()
            .uri("/v2/heartbeat")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://vds.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}
