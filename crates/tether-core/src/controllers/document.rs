//! `document` controller

use serde_json::{json, Value};

use crate::client::{QueryOptions, Sdk};
use crate::error::SdkResult;
use crate::message::{keys, Document, JsonObject, Request};
use crate::search_result::{
    DocumentHits, DocumentSearchResult, HitMapper, SearchActions, SearchResult,
};

/// Pagination and search arguments
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub from: Option<u64>,
    pub size: Option<u64>,
    /// Scroll duration, e.g. `"30s"`
    pub scroll: Option<String>,
    /// Query language (`elasticsearch` or `koncorde`)
    pub lang: Option<String>,
    pub query: QueryOptions,
}

/// Outcome of a multi-get
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MGetResult {
    pub successes: Vec<Document>,
    /// Ids that could not be fetched
    pub errors: Vec<String>,
}

/// Borrowed view on the `document` controller
pub struct DocumentController<'a> {
    sdk: &'a Sdk,
}

impl<'a> DocumentController<'a> {
    pub const NAME: &'static str = "document";

    pub fn new(sdk: &'a Sdk) -> Self {
        Self { sdk }
    }

    fn request(action: &str, index: &str, collection: &str) -> Request {
        Request::new(Self::NAME, action)
            .with(keys::INDEX, index)
            .with(keys::COLLECTION, collection)
    }

    /// Fetch one document
    pub async fn get(&self, index: &str, collection: &str, id: &str) -> SdkResult<Document> {
        let request = Self::request("get", index, collection).with(keys::ID, id);
        let response = self.sdk.send_request(request, QueryOptions::default()).await?;
        Ok(serde_json::from_value(response.result)?)
    }

    /// Fetch several documents at once
    pub async fn m_get(&self, index: &str, collection: &str, ids: &[String]) -> SdkResult<MGetResult> {
        let request =
            Self::request("mGet", index, collection).with(keys::BODY, json!({ "ids": ids }));
        let response = self.sdk.send_request(request, QueryOptions::default()).await?;

        let successes = match response.result.get("successes") {
            Some(successes) => serde_json::from_value(successes.clone())?,
            None => Vec::new(),
        };
        let errors = response
            .result
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| errors.iter().filter_map(failed_id).collect())
            .unwrap_or_default();

        Ok(MGetResult { successes, errors })
    }

    /// Search documents
    pub async fn search(
        &self,
        index: &str,
        collection: &str,
        body: JsonObject,
        options: SearchOptions,
    ) -> SdkResult<DocumentSearchResult> {
        self.search_with(index, collection, body, options, DocumentHits)
            .await
    }

    /// Search documents, mapping hits through `mapper`
    pub async fn search_with<M: HitMapper>(
        &self,
        index: &str,
        collection: &str,
        body: JsonObject,
        options: SearchOptions,
        mapper: M,
    ) -> SdkResult<SearchResult<M>> {
        let mut request = Self::request("search", index, collection).with_body(body);
        if let Some(from) = options.from {
            request.set(keys::FROM, from);
        }
        if let Some(size) = options.size {
            request.set(keys::SIZE, size);
        }
        if let Some(scroll) = &options.scroll {
            request.set(keys::SCROLL, scroll.as_str());
        }
        if let Some(lang) = &options.lang {
            request.set("lang", lang.as_str());
        }

        SearchResult::search(self.sdk, SearchActions::document(), request, options.query, mapper).await
    }
}

/// Id of a failed multi-get entry, given either as a bare id or an object
fn failed_id(error: &Value) -> Option<String> {
    match error {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map
            .get(keys::ID)
            .or_else(|| map.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
