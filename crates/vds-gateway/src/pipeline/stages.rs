//! The built-in pipeline stages.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use vds_auth::TokenService;
use vds_core::{BrokerError, CorrelationId, Identity};

use super::{Inbound, Outcome, RequestContext, Stage};
use crate::error::ApiError;
use crate::routes::Route;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Fields masked before a request body is logged.
const REDACTED_FIELDS: [&str; 2] = ["password", "token"];

// =============================================================================
// Content type
// =============================================================================

/// Rejects state-changing requests that do not declare a JSON body.
#[derive(Debug, Default)]
pub struct ContentTypeGuard;

#[async_trait]
impl Stage for ContentTypeGuard {
    async fn before(&self, inbound: &mut Inbound, _ctx: &mut RequestContext) -> Result<(), ApiError> {
        if !inbound.is_state_changing() || inbound.route.is_liveness() {
            return Ok(());
        }

        let is_json = inbound
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE));

        if is_json {
            Ok(())
        } else {
            Err(ApiError::UnsupportedMediaType)
        }
    }
}

// =============================================================================
// Body
// =============================================================================

/// Reads the body and parses it as JSON into the context.
#[derive(Debug)]
pub struct BodyParser {
    max_bytes: usize,
}

impl BodyParser {
    /// Create a parser that refuses bodies larger than `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Stage for BodyParser {
    async fn before(&self, inbound: &mut Inbound, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let Some(body) = inbound.take_body() else {
            return Ok(());
        };

        // Read failures past the length check only happen when the client
        // goes away, so they are reported as the limit too.
        let bytes = axum::body::to_bytes(body, self.max_bytes)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to read request body");
                ApiError::PayloadTooLarge
            })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            ctx.body = None;
            return Ok(());
        }

        let doc: Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(error = %e, path = %inbound.path, "Malformed JSON body");
            ApiError::MalformedJson
        })?;
        ctx.body = Some(doc);
        Ok(())
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Assigns a correlation id and logs each request and its outcome.
///
/// The liveness route is not logged.
#[derive(Debug, Default)]
pub struct AuditStage;

#[async_trait]
impl Stage for AuditStage {
    async fn before(&self, inbound: &mut Inbound, ctx: &mut RequestContext) -> Result<(), ApiError> {
        if inbound.route.is_liveness() {
            return Ok(());
        }

        let correlation_id = CorrelationId::generate();
        ctx.correlation_id = Some(correlation_id);

        let body = ctx.body.as_ref().map(redact);
        tracing::info!(
            correlation_id = %correlation_id,
            method = %inbound.method,
            remote = ?inbound.remote,
            path = %inbound.path,
            body = ?body,
            "**REQUEST**"
        );
        Ok(())
    }

    fn after(&self, inbound: &Inbound, ctx: &RequestContext, outcome: &Outcome) {
        let Some(correlation_id) = ctx.correlation_id else {
            return;
        };

        let body = outcome.body.as_ref().map(redact);
        tracing::info!(
            correlation_id = %correlation_id,
            route = %inbound.route,
            status = outcome.status.as_u16(),
            success = outcome.succeeded,
            body = ?body,
            "**RESPONSE**"
        );
    }
}

/// Copy a JSON document with secret fields masked, at any depth.
fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if REDACTED_FIELDS.contains(&key.as_str()) {
                        (key.clone(), Value::String("***".to_string()))
                    } else {
                        (key.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Verifies the `token` field of the request document.
pub struct AuthStage {
    tokens: Arc<TokenService>,
    exempt: HashSet<Route>,
}

impl AuthStage {
    /// Create an auth stage that skips the `exempt` routes.
    #[must_use]
    pub fn new(tokens: Arc<TokenService>, exempt: HashSet<Route>) -> Self {
        Self { tokens, exempt }
    }
}

#[async_trait]
impl Stage for AuthStage {
    async fn before(&self, inbound: &mut Inbound, ctx: &mut RequestContext) -> Result<(), ApiError> {
        if self.exempt.contains(&inbound.route) {
            return Ok(());
        }

        let token = ctx
            .body
            .as_ref()
            .and_then(|body| body.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| BrokerError::InvalidToken("missing token field".to_string()))?;

        let payload = self.tokens.verify(token)?;
        let identity = Identity::new(payload)
            .map_err(|e| BrokerError::InvalidToken(format!("unusable payload: {e}")))?;

        tracing::debug!(identity = %identity, route = %inbound.route, "Token accepted");
        ctx.identity = Some(identity);
        Ok(())
    }
}
