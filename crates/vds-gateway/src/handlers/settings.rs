//! Client settings endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::Handler;
use crate::error::ApiError;
use crate::pipeline::{Reply, RequestContext};

/// Names of the settings a client asks for.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SettingsQuery {
    /// A single setting name.
    One(String),
    /// Several setting names.
    Many(Vec<String>),
}

impl SettingsQuery {
    fn names(&self) -> &[String] {
        match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Many(names) => names,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SettingsBody {
    query: SettingsQuery,
}

/// Returns the requested subset of the configured settings.
///
/// Unknown names are left out of the result.
#[derive(Debug)]
pub struct Settings {
    settings: BTreeMap<String, Value>,
}

impl Settings {
    /// Serve the given settings.
    #[must_use]
    pub const fn new(settings: BTreeMap<String, Value>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Handler for Settings {
    async fn handle(&self, ctx: &RequestContext) -> Result<Reply, ApiError> {
        let body: SettingsBody = ctx.parse_body()?;

        let selected: Map<String, Value> = body
            .query
            .names()
            .iter()
            .filter_map(|name| {
                self.settings
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        Ok(Reply::ok(Value::Object(selected)))
    }
}
