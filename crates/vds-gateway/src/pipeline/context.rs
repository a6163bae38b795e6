//! Per-request state shared by stages and handlers.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;
use vds_core::{BrokerError, CorrelationId, Identity};

use crate::error::ApiError;
use crate::routes::Route;

/// Client message for a request document that does not fit the route.
const INVALID_BODY: &str = "Invalid request body";

/// The request head as seen by the stages, plus the unread body.
#[derive(Debug)]
pub struct Inbound {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// The route the path resolved to.
    pub route: Route,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Peer address, when the server was started with connect info.
    pub remote: Option<SocketAddr>,
    body: Option<Body>,
}

impl Inbound {
    /// Create an inbound request.
    #[must_use]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        route: Route,
        content_type: Option<String>,
        remote: Option<SocketAddr>,
        body: Body,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            route,
            content_type,
            remote,
            body: Some(body),
        }
    }

    /// Take the body. Returns `None` once it has been taken.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Returns `true` for methods that carry a request document.
    #[must_use]
    pub fn is_state_changing(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Mutable per-request context.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Parsed request document, absent for an empty body.
    pub body: Option<Value>,
    /// Correlation id assigned by the audit stage.
    pub correlation_id: Option<CorrelationId>,
    /// Identity established by the auth stage.
    pub identity: Option<Identity>,
    /// Result document produced by the handler.
    pub result: Option<Value>,
}

impl RequestContext {
    /// Deserialize the request document into a handler's body type.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` if required fields are missing or mistyped.
    pub fn parse_body<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(|e| {
            tracing::debug!(error = %e, "Request body rejected");
            ApiError::BadRequest(INVALID_BODY.to_string())
        })
    }

    /// The authenticated identity.
    ///
    /// # Errors
    ///
    /// Fails as an invalid token when the auth stage did not run for this route.
    pub fn identity(&self) -> Result<&Identity, ApiError> {
        self.identity
            .as_ref()
            .ok_or_else(|| BrokerError::InvalidToken("no authenticated identity".to_string()).into())
    }
}

/// A successful handler response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Response status.
    pub status: StatusCode,
    /// Response document, if any.
    pub body: Option<Value>,
}

impl Reply {
    /// `200 OK` with a JSON document.
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    /// `204 No Content`.
    #[must_use]
    pub const fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

/// The final result of a request, visible to the `after` hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Response status.
    pub status: StatusCode,
    /// Response document (result or `{"err": ...}`).
    pub body: Option<Value>,
    /// Whether the handler succeeded.
    pub succeeded: bool,
}

impl From<Result<Reply, ApiError>> for Outcome {
    fn from(result: Result<Reply, ApiError>) -> Self {
        match result {
            Ok(reply) => Self {
                status: reply.status,
                body: reply.body,
                succeeded: true,
            },
            Err(err) => Self {
                status: err.status_code(),
                body: Some(err.body()),
                succeeded: false,
            },
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}
