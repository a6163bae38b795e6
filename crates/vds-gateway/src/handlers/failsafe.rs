//! Handler installed on every route when the backends failed to initialize.

use async_trait::async_trait;

use super::Handler;
use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};

/// Always fails with `503 {"err": "Out of service"}`.
#[derive(Debug, Default)]
pub struct OutOfService;

#[async_trait]
impl Handler for OutOfService {
    async fn handle(&self, _ctx: &RequestContext) -> Result<Reply, ApiError> {
        Err(ApiError::OutOfService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn out_of_service_ignores_request() {
        let ctx = RequestContext {
            body: Some(json!({ "username": "alice", "password": "secret" })),
            ..RequestContext::default()
        };
        let err = OutOfService.handle(&ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body(), json!({ "err": "Out of service" }));
    }
}
