//! Request pipeline.
//!
//! Every request runs through an ordered chain of [`Stage`]s before reaching
//! its route handler:
//!
//! ```text
//! ContentTypeGuard → BodyParser → AuditStage → AuthStage → Handler
//! ```
//!
//! A failing `before` hook skips the remaining hooks and the handler. The
//! `after` hooks of every stage whose `before` completed then run in reverse
//! order, and the outcome is serialized.

mod context;
pub mod stages;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use vds_auth::TokenService;

pub use context::{Inbound, Outcome, Reply, RequestContext};

use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::routes::{Mode, Route, RouteTable};
use stages::{AuditStage, AuthStage, BodyParser, ContentTypeGuard};

/// One link in the request pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Inspect or enrich the request before dispatch. An error short-circuits.
    async fn before(&self, _inbound: &mut Inbound, _ctx: &mut RequestContext) -> Result<(), ApiError> {
        Ok(())
    }

    /// Observe the outcome after dispatch.
    fn after(&self, _inbound: &Inbound, _ctx: &RequestContext, _outcome: &Outcome) {}
}

/// The stage chain plus the installed route table.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    routes: RouteTable,
    prefix: String,
}

impl Pipeline {
    /// Build the pipeline for an installed route table.
    ///
    /// The failsafe table only gets the audit stage, so every request reaches
    /// the out-of-service handler whatever its content type or body.
    #[must_use]
    pub fn new(routes: RouteTable, tokens: Arc<TokenService>, config: &GatewayConfig) -> Self {
        let stages: Vec<Box<dyn Stage>> = match routes.mode() {
            Mode::Live => vec![
                Box::new(ContentTypeGuard),
                Box::new(BodyParser::new(config.max_body_bytes)),
                Box::new(AuditStage),
                Box::new(AuthStage::new(tokens, routes.exempt_routes().clone())),
            ],
            Mode::Failsafe => vec![Box::new(AuditStage)],
        };

        Self {
            stages,
            routes,
            prefix: config.route_prefix.clone(),
        }
    }

    /// The installed route table.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run a request through the stages and its handler.
    pub async fn process(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        let Some(route) = Route::resolve(&self.prefix, &path) else {
            return ApiError::NotFound(path).into_response();
        };
        if !self.routes.accepts(route, &parts.method) {
            return ApiError::MethodNotAllowed.into_response();
        }
        let Some(handler) = self.routes.handler(route) else {
            return ApiError::NotFound(path).into_response();
        };

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let mut inbound = Inbound::new(parts.method, path, route, content_type, remote, body);
        let mut ctx = RequestContext::default();

        let mut completed = 0;
        let mut failure = None;
        for stage in &self.stages {
            if let Err(err) = stage.before(&mut inbound, &mut ctx).await {
                failure = Some(err);
                break;
            }
            completed += 1;
        }

        let result = match failure {
            Some(err) => Err(err),
            None => handler.handle(&ctx).await,
        };

        let outcome = Outcome::from(result);
        if outcome.succeeded {
            ctx.result.clone_from(&outcome.body);
        }

        for stage in self.stages[..completed].iter().rev() {
            stage.after(&inbound, &ctx, &outcome);
        }

        outcome.into_response()
    }
}
