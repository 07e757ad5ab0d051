//! Command handlers

pub mod config;
pub mod query;
pub mod search;
pub mod watch;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use tether_core::JsonObject;

/// Parse a JSON object given on the command line
pub fn parse_object(raw: Option<&str>) -> Result<JsonObject> {
    let Some(raw) = raw else {
        return Ok(JsonObject::new());
    };
    let value: Value = serde_json::from_str(raw).context("Invalid JSON body")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("The body must be a JSON object, got: {}", other),
    }
}
