//! API error types and responses.
//!
//! Every failure leaves the gateway as `{"err": <message>}`. Domain failures
//! (`BrokerError`) become an `ApiError` through [`translate`], the one place
//! that decides what a client is told about them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vds_auth::AuthError;
use vds_core::{Backend, BrokerError};
use vds_hypervisor::HypervisorError;

/// Status code for request bodies that are not valid JSON.
pub const MALFORMED_JSON_STATUS: u16 = 753;

const INVALID_CREDENTIALS: &str = "Invalid username or password";
const INVALID_TOKEN: &str = "Invalid token";
const DIRECTORY_UNAVAILABLE: &str = "Cannot connect to directory server";
const HYPERVISOR_UNAVAILABLE: &str =
    "Virtual desktop server is unable to execute certain operations";
const UNEXPECTED: &str = "Unexpected error";

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials or token rejected.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// A backend could not serve the request.
    #[error("{0}")]
    ServiceUnavailable(&'static str),

    /// The broker started in failsafe mode.
    #[error("Out of service")]
    OutOfService,

    /// A state-changing request did not declare a JSON body.
    #[error("Unsupported media type: application/json required")]
    UnsupportedMediaType,

    /// The request body is not valid JSON.
    #[error("Malformed JSON")]
    MalformedJson,

    /// Invalid request body or parameters.
    #[error("{0}")]
    BadRequest(String),

    /// No route matches the path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The route exists but not for this method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The request body exceeds the configured limit.
    #[error("Payload too large")]
    PayloadTooLarge,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    err: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ServiceUnavailable(_) | Self::OutOfService => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MalformedJson => {
                StatusCode::from_u16(MALFORMED_JSON_STATUS).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::OutOfService => "out_of_service",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::MalformedJson => "malformed_json",
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::PayloadTooLarge => "payload_too_large",
        }
    }

    /// The JSON body sent to the client.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "err": self.to_string() })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            err: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Translate a domain failure into the response a client sees.
///
/// Operator-facing detail is logged here and never reaches the client.
#[must_use]
pub fn translate(err: BrokerError) -> ApiError {
    let kind = err.kind();
    match err {
        BrokerError::AuthFailure(detail) => {
            tracing::warn!(kind, detail = %detail, "Authentication failed");
            ApiError::Unauthorized(INVALID_CREDENTIALS)
        }
        BrokerError::InvalidToken(detail) => {
            tracing::warn!(kind, detail = %detail, "Token rejected");
            ApiError::Unauthorized(INVALID_TOKEN)
        }
        BrokerError::BackendUnavailable { backend, message } => {
            tracing::error!(kind, backend = %backend, error = %message, "Backend unavailable");
            match backend {
                Backend::Directory => ApiError::ServiceUnavailable(DIRECTORY_UNAVAILABLE),
                Backend::Hypervisor => ApiError::ServiceUnavailable(HYPERVISOR_UNAVAILABLE),
            }
        }
        BrokerError::BackendOperationRejected(message) | BrokerError::MalformedInput(message) => {
            tracing::error!(kind, error = %message, "Unexpected error");
            ApiError::ServiceUnavailable(UNEXPECTED)
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        translate(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        translate(err.into())
    }
}

impl From<HypervisorError> for ApiError {
    fn from(err: HypervisorError) -> Self {
        translate(err.into())
    }
}
