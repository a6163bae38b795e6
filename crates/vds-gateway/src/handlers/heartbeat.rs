//! Liveness probe.

use async_trait::async_trait;

use super::Handler;
use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};

/// Answers `204 No Content` while the process is up.
#[derive(Debug, Default)]
pub struct Heartbeat;

#[async_trait]
impl Handler for Heartbeat {
    async fn handle(&self, _ctx: &RequestContext) -> Result<Reply, ApiError> {
        Ok(Reply::no_content())
    }
}
