//! Query command handler

use anyhow::{Context, Result};
use serde_json::Value;

use tether_core::message::keys;
use tether_core::{QueryOptions, Request, Sdk};

use super::parse_object;
use crate::output::Output;

/// Optional resource the request is about
#[derive(Debug, Default)]
pub struct Target {
    pub index: Option<String>,
    pub collection: Option<String>,
    pub id: Option<String>,
}

/// Build the request for a raw query
pub fn build_request(
    controller: &str,
    action: &str,
    target: Target,
    body: Option<&str>,
) -> Result<Request> {
    let mut request = Request::new(controller, action);
    if let Some(index) = target.index {
        request.set(keys::INDEX, index);
    }
    if let Some(collection) = target.collection {
        request.set(keys::COLLECTION, collection);
    }
    if let Some(id) = target.id {
        request.set(keys::ID, id);
    }
    if body.is_some() {
        request.set(keys::BODY, Value::Object(parse_object(body)?));
    }
    Ok(request)
}

/// Send a raw request and print its result
pub async fn run(
    sdk: &Sdk,
    controller: &str,
    action: &str,
    target: Target,
    body: Option<&str>,
    output: &Output,
) -> Result<()> {
    let request = build_request(controller, action, target, body)?;
    let response = sdk
        .send_request(request, QueryOptions::default())
        .await
        .with_context(|| format!("{}:{} failed", controller, action))?;

    output.print_result(&response.result);
    Ok(())
}
