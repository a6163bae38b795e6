//! Route handlers.
//!
//! Handlers run after every pipeline stage succeeded. They read the parsed
//! request document and the authenticated identity from the
//! [`RequestContext`] and return a [`Reply`] or an [`ApiError`].

pub mod connect;
pub mod failsafe;
pub mod heartbeat;
pub mod login;
pub mod settings;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};

/// Serves one route.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a request that passed the pipeline.
    async fn handle(&self, ctx: &RequestContext) -> Result<Reply, ApiError>;
}
