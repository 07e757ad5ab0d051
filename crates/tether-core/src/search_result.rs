//! Paginated search results
//!
//! A [`SearchResult`] holds one page of hits plus what it needs to fetch the
//! next one. Which pagination strategy `next()` uses depends on the request
//! that produced the page, checked in this order:
//!
//! 1. `scroll`: call the scroll action with the last scroll id
//! 2. `size` and `body.sort`: resubmit with `body.search_after` set from the
//!    last hit's sort values
//! 3. `size` and `from`: resubmit with `from` advanced by `size`
//!
//! Every page is a new cursor; earlier cursors are never modified.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::client::{QueryOptions, Sdk};
use crate::error::{SdkError, SdkResult};
use crate::message::{keys, Document, Hit, JsonObject, Request, SearchResponse};

/// Turns raw hits into the values a cursor exposes
#[async_trait]
pub trait HitMapper: Clone + Send + Sync + 'static {
    type Output: Send + Sync;

    async fn map_hits(&self, hits: &[Hit]) -> SdkResult<Vec<Self::Output>>;
}

/// Exposes hits as plain documents
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentHits;

#[async_trait]
impl HitMapper for DocumentHits {
    type Output = Document;

    async fn map_hits(&self, hits: &[Hit]) -> SdkResult<Vec<Document>> {
        Ok(hits.iter().cloned().map(Document::from).collect())
    }
}

/// Controller and action names a cursor pages through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchActions {
    pub controller: String,
    pub search: String,
    pub scroll: String,
}

impl SearchActions {
    pub fn new(controller: &str, search: &str, scroll: &str) -> Self {
        Self {
            controller: controller.to_string(),
            search: search.to_string(),
            scroll: scroll.to_string(),
        }
    }

    /// `document:search` / `document:scroll`
    pub fn document() -> Self {
        Self::new("document", "search", "scroll")
    }
}

/// One page of search results
pub struct SearchResult<M: HitMapper> {
    pub hits: Vec<M::Output>,
    /// Matches reported by the backend
    pub total: u64,
    /// Hits fetched so far, this page included
    pub fetched: u64,
    pub aggregations: Option<Value>,
    pub scroll_id: Option<String>,
    raw_hits: Vec<Hit>,
    request: Request,
    options: QueryOptions,
    actions: SearchActions,
    sdk: Sdk,
    mapper: M,
}

/// Search results exposing plain documents
pub type DocumentSearchResult = SearchResult<DocumentHits>;

impl<M: HitMapper> std::fmt::Debug for SearchResult<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResult")
            .field("route", &self.request.route())
            .field("hits", &self.raw_hits.len())
            .field("total", &self.total)
            .field("fetched", &self.fetched)
            .finish()
    }
}

impl<M: HitMapper> SearchResult<M> {
    /// Send a search request and wrap its first page
    pub async fn search(
        sdk: &Sdk,
        actions: SearchActions,
        request: Request,
        options: QueryOptions,
        mapper: M,
    ) -> SdkResult<Self> {
        let request = request
            .with(keys::CONTROLLER, actions.controller.as_str())
            .with(keys::ACTION, actions.search.as_str());
        let page = fetch_page(sdk, request.clone(), options.clone()).await?;
        Self::from_page(sdk.clone(), actions, request, options, mapper, page, 0).await
    }

    async fn from_page(
        sdk: Sdk,
        actions: SearchActions,
        request: Request,
        options: QueryOptions,
        mapper: M,
        page: SearchResponse,
        fetched_before: u64,
    ) -> SdkResult<Self> {
        let hits = mapper.map_hits(&page.hits).await?;
        Ok(Self {
            hits,
            total: page.total,
            fetched: fetched_before + page.hits.len() as u64,
            aggregations: page.aggregations,
            scroll_id: page.scroll_id,
            raw_hits: page.hits,
            request,
            options,
            actions,
            sdk,
            mapper,
        })
    }

    /// The hits of this page as returned by the backend
    pub fn raw_hits(&self) -> &[Hit] {
        &self.raw_hits
    }

    /// The request that produced this page
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Whether every match has been fetched
    pub fn is_exhausted(&self) -> bool {
        self.fetched >= self.total
    }

    /// Fetch the next page
    ///
    /// Resolves to `None`, without calling the backend, once every match has
    /// been fetched, and to `None` as well when the backend answers with an
    /// empty page before `total` is reached. A `size` of 0 is no pagination
    /// hint. Fails with [`SdkError::PaginationUnsupported`] when the
    /// originating request carried no pagination hint.
    pub async fn next(&self) -> SdkResult<Option<Self>> {
        if self.is_exhausted() {
            return Ok(None);
        }

        if let Some(scroll) = self.request.get(keys::SCROLL).filter(|v| !v.is_null()) {
            let Some(scroll_id) = &self.scroll_id else {
                return Err(SdkError::Protocol(
                    "scroll search response carries no scroll id".to_string(),
                ));
            };
            let request = Request::new(&self.actions.controller, &self.actions.scroll)
                .with(keys::SCROLL, scroll.clone())
                .with(keys::SCROLL_ID, scroll_id.as_str());
            debug!("Scrolling {} ({} of {})", self.actions.controller, self.fetched, self.total);
            let page = fetch_page(&self.sdk, request, self.options.clone()).await?;
            // Later pages still page by scroll, so keep the original request
            return self.next_page(self.request.clone(), page).await;
        }

        let size = self.request.get_u64(keys::SIZE).filter(|size| *size > 0);
        let sort = self
            .request
            .body()
            .and_then(|body| body.get(keys::SORT))
            .filter(|sort| !sort.is_null());

        if let (Some(_), Some(sort)) = (size, sort) {
            let Some(last) = self.raw_hits.last() else {
                return Ok(None);
            };
            let marker = search_after(sort, last);
            let mut request = self
                .request
                .clone()
                .with(keys::ACTION, self.actions.search.as_str());
            request
                .body_mut()
                .insert(keys::SEARCH_AFTER.to_string(), Value::Array(marker));
            let page = fetch_page(&self.sdk, request.clone(), self.options.clone()).await?;
            return self.next_page(request, page).await;
        }

        if let (Some(size), Some(from)) = (size, self.request.get_u64(keys::FROM)) {
            let Some(next_from) = from.checked_add(size).filter(|next| *next < self.total) else {
                return Ok(None);
            };
            let request = self
                .request
                .clone()
                .with(keys::ACTION, self.actions.search.as_str())
                .with(keys::FROM, next_from);
            let page = fetch_page(&self.sdk, request.clone(), self.options.clone()).await?;
            return self.next_page(request, page).await;
        }

        Err(SdkError::PaginationUnsupported)
    }

    async fn next_page(&self, request: Request, page: SearchResponse) -> SdkResult<Option<Self>> {
        if page.hits.is_empty() {
            debug!(
                "Empty page from {} after {} of {} hits",
                request.route(),
                self.fetched,
                self.total
            );
            return Ok(None);
        }
        Self::from_page(
            self.sdk.clone(),
            self.actions.clone(),
            request,
            self.options.clone(),
            self.mapper.clone(),
            page,
            self.fetched,
        )
        .await
        .map(Some)
    }
}

async fn fetch_page(sdk: &Sdk, request: Request, options: QueryOptions) -> SdkResult<SearchResponse> {
    let response = sdk.send_request(request, options).await?;
    Ok(serde_json::from_value(response.result)?)
}

/// Sort values of a hit, one per sort clause
///
/// `_id` comes from the hit itself, other fields from its source (dotted
/// paths allowed), falling back to the sort values the backend returned.
fn search_after(sort: &Value, hit: &Hit) -> Vec<Value> {
    let clauses = match sort {
        Value::Array(clauses) => clauses.clone(),
        other => vec![other.clone()],
    };

    clauses
        .iter()
        .enumerate()
        .map(|(position, clause)| {
            let field = match clause {
                Value::String(field) => Some(field.as_str()),
                Value::Object(map) => map.keys().next().map(String::as_str),
                _ => None,
            };
            match field {
                Some("_id") => Value::String(hit.id.clone()),
                Some(field) => source_field(&hit.source, field)
                    .cloned()
                    .or_else(|| hit.sort.as_ref().and_then(|s| s.get(position).cloned()))
                    .unwrap_or(Value::Null),
                None => Value::Null,
            }
        })
        .collect()
}

fn source_field<'a>(source: &'a JsonObject, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = source.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::SdkConfig;
    use crate::protocol::MockProtocol;

    fn setup() -> (Sdk, Arc<MockProtocol>) {
        let mock = Arc::new(MockProtocol::new());
        mock.set_ready(true);
        (Sdk::new(mock.clone(), SdkConfig::default()), mock)
    }

    fn page(total: u64, hits: Value) -> Value {
        json!({ "total": total, "hits": hits })
    }

    async fn first_page(sdk: &Sdk, request: Request) -> DocumentSearchResult {
        SearchResult::search(
            sdk,
            SearchActions::document(),
            request,
            QueryOptions::default(),
            DocumentHits,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_from_size_advances_offset() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(30, json!([{ "_id": "a" }, { "_id": "b" }]))));

        let request = Request::new("document", "search")
            .with("index", "nyc")
            .with("collection", "taxis")
            .with("from", 2)
            .with("size", 2)
            .with("body", json!({ "query": { "match_all": {} } }));
        let cursor = first_page(&sdk, request).await;
        assert_eq!(cursor.fetched, 2);
        assert_eq!(cursor.hits[0].id, "a");

        let next = cursor.next().await.unwrap().unwrap();
        assert_eq!(next.fetched, 4);

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].get("from"), Some(&json!(4)));
        assert_eq!(sent[1].get("size"), Some(&json!(2)));
        assert_eq!(sent[1].body(), sent[0].body());

        // Earlier cursors are snapshots
        assert_eq!(cursor.fetched, 2);
        assert_eq!(cursor.request().get("from"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_from_past_total_stops_without_request() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(30, json!([{ "_id": "a" }, { "_id": "b" }]))));

        let request = Request::new("document", "search")
            .with("from", 30)
            .with("size", 2);
        let cursor = first_page(&sdk, request).await;
        mock.clear_sent();

        assert!(cursor.next().await.unwrap().is_none());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_cursor_stops_without_request() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(2, json!([{ "_id": "a" }, { "_id": "b" }]))));

        let cursor = first_page(&sdk, Request::new("document", "search").with("scroll", "1m")).await;
        mock.clear_sent();

        assert!(cursor.is_exhausted());
        assert!(cursor.next().await.unwrap().is_none());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_search_uses_search_after() {
        let (sdk, mock) = setup();
        mock.on_request(|_| {
            Ok(page(
                30,
                json!([
                    { "_id": "a", "_source": { "name": "bar", "age": 12 } },
                    { "_id": "b", "_source": { "name": "baz", "age": 3456 } }
                ]),
            ))
        });

        let body = json!({
            "query": { "term": { "city": "nyc" } },
            "sort": [{ "name": "asc" }, "age"]
        });
        let request = Request::new("document", "search")
            .with("size", 2)
            .with("body", body.clone());
        let cursor = first_page(&sdk, request).await;

        let next = cursor.next().await.unwrap().unwrap();
        assert_eq!(next.fetched, 4);

        let sent = &mock.sent()[1];
        assert_eq!(sent.action(), Some("search"));
        let sent_body = sent.body().unwrap();
        assert_eq!(sent_body["search_after"], json!(["baz", 3456]));
        assert_eq!(sent_body["sort"], body["sort"]);
        assert_eq!(sent_body["query"], body["query"]);
    }

    #[test]
    fn test_search_after_id_and_nested_fields() {
        let hit = Hit {
            id: "doc-9".to_string(),
            source: json!({ "driver": { "name": "ada" } })
                .as_object()
                .cloned()
                .unwrap(),
            sort: Some(vec![json!("ignored"), json!("ignored"), json!(42)]),
            ..Hit::default()
        };
        let sort = json!(["_id", { "driver.name": "desc" }, "missing"]);

        assert_eq!(search_after(&sort, &hit), vec![json!("doc-9"), json!("ada"), json!(42)]);
    }

    #[tokio::test]
    async fn test_scroll_sends_only_scroll_fields() {
        let (sdk, mock) = setup();
        mock.on_request(|request| {
            let id = match request.action() {
                Some("scroll") => "scroll-2",
                _ => "scroll-1",
            };
            Ok(json!({ "total": 30, "hits": [{ "_id": "a" }], "scrollId": id }))
        });

        let request = Request::new("document", "search")
            .with("index", "nyc")
            .with("scroll", "30s")
            .with("size", 1)
            .with("body", json!({ "query": { "match_all": {} } }));
        let cursor = first_page(&sdk, request).await;
        let second = cursor.next().await.unwrap().unwrap();
        let third = second.next().await.unwrap().unwrap();

        assert_eq!(third.fetched, 3);
        let scrolls = mock.sent_to("document", "scroll");
        assert_eq!(scrolls.len(), 2);
        assert_eq!(scrolls[0].get("scrollId"), Some(&json!("scroll-1")));
        assert_eq!(scrolls[1].get("scrollId"), Some(&json!("scroll-2")));

        let mut keys: Vec<&String> = scrolls[0]
            .as_object()
            .keys()
            .filter(|k| !matches!(k.as_str(), "requestId" | "volatile"))
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["action", "controller", "scroll", "scrollId"]);
    }

    #[tokio::test]
    async fn test_empty_page_ends_pagination() {
        let (sdk, mock) = setup();
        mock.on_request(|request| match request.action() {
            Some("scroll") => Ok(json!({ "total": 30, "hits": [], "scrollId": "scroll-2" })),
            _ => Ok(json!({ "total": 30, "hits": [{ "_id": "a" }], "scrollId": "scroll-1" })),
        });

        let cursor = first_page(&sdk, Request::new("document", "search").with("scroll", "30s")).await;
        assert!(!cursor.is_exhausted());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(mock.sent_to("document", "scroll").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_from_size_page_ends_pagination() {
        let (sdk, mock) = setup();
        mock.on_request(|request| match request.get("from") {
            Some(from) if *from == json!(0) => Ok(page(30, json!([{ "_id": "a" }]))),
            _ => Ok(page(30, json!([]))),
        });

        let request = Request::new("document", "search").with("from", 0).with("size", 1);
        let cursor = first_page(&sdk, request).await;
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_size_is_not_a_pagination_hint() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(30, json!([{ "_id": "a" }]))));

        let request = Request::new("document", "search").with("from", 0).with("size", 0);
        let cursor = first_page(&sdk, request).await;
        mock.clear_sent();

        let err = cursor.next().await.unwrap_err();
        assert!(matches!(err, SdkError::PaginationUnsupported));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_offset_overflow_stops_without_request() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(30, json!([{ "_id": "a" }]))));

        let request = Request::new("document", "search")
            .with("from", u64::MAX)
            .with("size", 2);
        let cursor = first_page(&sdk, request).await;
        mock.clear_sent();

        assert!(cursor.next().await.unwrap().is_none());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_pagination_unsupported() {
        let (sdk, mock) = setup();
        mock.on_request(|_| Ok(page(30, json!([{ "_id": "a" }]))));

        let cursor = first_page(&sdk, Request::new("document", "search").with("size", 1)).await;
        let err = cursor.next().await.unwrap_err();

        assert!(matches!(err, SdkError::PaginationUnsupported));
    }
}
