//! Realtime document observer
//!
//! Keeps documents held by the application in sync with the backend. Every
//! observed document lives in a bucket keyed by `(index, collection)`, and
//! each bucket is backed by one subscription whose filter lists exactly the
//! ids in the bucket. Notifications update tracked documents in place, so
//! every clone of a [`RealtimeDocument`] sees the change.
//!
//! Call one of the `stop_*` methods before dropping the observer, otherwise
//! its subscriptions stay open for the life of the connection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::Sdk;
use crate::controllers::{NotificationHandler, SearchOptions, SubscribeOptions};
use crate::error::SdkResult;
use crate::message::{Document, Hit, JsonObject, Notification, NotificationEvent};
use crate::search_result::{HitMapper, SearchResult};

type BucketKey = (String, String);

struct TrackedDocument {
    id: String,
    index: String,
    collection: String,
    content: Mutex<JsonObject>,
    deleted: AtomicBool,
}

/// Handle on an observed document
///
/// Clones share the same record: an update delivered by a notification is
/// visible through every handle.
#[derive(Clone)]
pub struct RealtimeDocument(Arc<TrackedDocument>);

impl RealtimeDocument {
    fn new(index: &str, collection: &str, document: Document) -> Self {
        Self(Arc::new(TrackedDocument {
            id: document.id,
            index: index.to_string(),
            collection: collection.to_string(),
            content: Mutex::new(document.source),
            deleted: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn index(&self) -> &str {
        &self.0.index
    }

    pub fn collection(&self) -> &str {
        &self.0.collection
    }

    /// Snapshot of the current content
    pub fn content(&self) -> JsonObject {
        self.0.content.lock().clone()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.content.lock().get(field).cloned()
    }

    /// Whether the document was deleted on the backend
    pub fn is_deleted(&self) -> bool {
        self.0.deleted.load(Ordering::SeqCst)
    }

    /// Whether both handles point to the same tracked record
    pub fn same_as(&self, other: &RealtimeDocument) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn merge(&self, changes: JsonObject) {
        let mut content = self.0.content.lock();
        for (key, value) in changes {
            content.insert(key, value);
        }
    }

    fn replace(&self, source: JsonObject) {
        *self.0.content.lock() = source;
    }
}

impl std::fmt::Debug for RealtimeDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeDocument")
            .field("index", &self.0.index)
            .field("collection", &self.0.collection)
            .field("id", &self.0.id)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Subscription backing one bucket
#[derive(Default)]
struct BucketRoom {
    room_id: Option<String>,
    /// Ids the current subscription filters on, sorted
    ids: Vec<String>,
}

struct ObserverInner {
    sdk: Sdk,
    buckets: Mutex<HashMap<BucketKey, BTreeMap<String, RealtimeDocument>>>,
    /// Held across the subscribe/unsubscribe pair, so resubscriptions of one
    /// bucket never overlap
    rooms: Mutex<HashMap<BucketKey, Arc<tokio::sync::Mutex<BucketRoom>>>>,
}

/// Outcome of an observed multi-get
#[derive(Debug, Clone, Default)]
pub struct ObservedMGet {
    pub successes: Vec<RealtimeDocument>,
    pub errors: Vec<String>,
}

/// Observes documents of any collection
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    pub fn new(sdk: Sdk) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                sdk,
                buckets: Mutex::new(HashMap::new()),
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start observing a document
    ///
    /// Resolves once the bucket subscription includes the document. Observing
    /// an id twice returns the same tracked record, refreshed with the given
    /// content.
    pub async fn observe(
        &self,
        index: &str,
        collection: &str,
        document: Document,
    ) -> SdkResult<RealtimeDocument> {
        let mut tracked = self.track(index, collection, vec![document]).await?;
        // track() returns one handle per input document
        Ok(tracked.remove(0))
    }

    /// Fetch a document and observe it
    pub async fn get(&self, index: &str, collection: &str, id: &str) -> SdkResult<RealtimeDocument> {
        let document = self.inner.sdk.document().get(index, collection, id).await?;
        self.observe(index, collection, document).await
    }

    /// Fetch several documents and observe the ones found
    pub async fn m_get(&self, index: &str, collection: &str, ids: &[String]) -> SdkResult<ObservedMGet> {
        let result = self.inner.sdk.document().m_get(index, collection, ids).await?;
        let successes = self.track(index, collection, result.successes).await?;
        Ok(ObservedMGet {
            successes,
            errors: result.errors,
        })
    }

    /// Search documents and observe every hit, page after page
    pub async fn search(
        &self,
        index: &str,
        collection: &str,
        body: JsonObject,
        options: SearchOptions,
    ) -> SdkResult<SearchResult<ObservedHits>> {
        let mapper = ObservedHits {
            observer: self.clone(),
            index: index.to_string(),
            collection: collection.to_string(),
        };
        self.inner
            .sdk
            .document()
            .search_with(index, collection, body, options, mapper)
            .await
    }

    /// Stop observing some documents of a collection
    pub async fn stop_documents(&self, index: &str, collection: &str, ids: &[String]) -> SdkResult<()> {
        let key = bucket_key(index, collection);
        {
            let mut buckets = self.inner.buckets.lock();
            if let Some(bucket) = buckets.get_mut(&key) {
                for id in ids {
                    bucket.remove(id);
                }
            }
        }
        self.resubscribe(key).await
    }

    /// Stop observing every document of a collection
    pub async fn stop_collection(&self, index: &str, collection: &str) -> SdkResult<()> {
        let key = bucket_key(index, collection);
        self.inner.buckets.lock().remove(&key);
        self.resubscribe(key).await
    }

    /// Stop observing everything
    pub async fn stop_all(&self) -> SdkResult<()> {
        let keys: Vec<BucketKey> = {
            let mut buckets = self.inner.buckets.lock();
            buckets.clear();
            self.inner.rooms.lock().keys().cloned().collect()
        };
        for key in keys {
            self.resubscribe(key).await?;
        }
        Ok(())
    }

    /// Number of documents observed in a collection
    pub fn observed_count(&self, index: &str, collection: &str) -> usize {
        self.inner
            .buckets
            .lock()
            .get(&bucket_key(index, collection))
            .map_or(0, BTreeMap::len)
    }

    /// Number of collections with observed documents
    pub fn bucket_count(&self) -> usize {
        self.inner.buckets.lock().len()
    }

    /// Subscription currently backing a collection, if any
    pub async fn room_id(&self, index: &str, collection: &str) -> Option<String> {
        let room = self
            .inner
            .rooms
            .lock()
            .get(&bucket_key(index, collection))
            .cloned()?;
        let room = room.lock().await;
        room.room_id.clone()
    }

    /// Add documents to a bucket, then resubscribe it once
    ///
    /// If the subscription fails, the documents this call started tracking
    /// are dropped again.
    async fn track(
        &self,
        index: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> SdkResult<Vec<RealtimeDocument>> {
        let key = bucket_key(index, collection);
        let mut added = Vec::new();
        let tracked = {
            let mut buckets = self.inner.buckets.lock();
            let bucket = buckets.entry(key.clone()).or_default();
            documents
                .into_iter()
                .map(|document| match bucket.get(&document.id) {
                    Some(existing) => {
                        existing.replace(document.source);
                        existing.clone()
                    }
                    None => {
                        let handle = RealtimeDocument::new(index, collection, document);
                        bucket.insert(handle.id().to_string(), handle.clone());
                        added.push(handle.clone());
                        handle
                    }
                })
                .collect::<Vec<_>>()
        };

        if let Err(e) = self.resubscribe(key.clone()).await {
            self.untrack(&key, &added);
            return Err(e);
        }
        Ok(tracked)
    }

    /// Remove handles from their bucket, if still tracked
    fn untrack(&self, key: &BucketKey, handles: &[RealtimeDocument]) {
        let mut buckets = self.inner.buckets.lock();
        let Some(bucket) = buckets.get_mut(key) else {
            return;
        };
        for handle in handles {
            if bucket.get(handle.id()).is_some_and(|held| held.same_as(handle)) {
                bucket.remove(handle.id());
            }
        }
        if bucket.is_empty() {
            buckets.remove(key);
        }
    }

    /// Bring a bucket's subscription in line with its current ids
    ///
    /// The new room is confirmed before the old one is dropped. An empty
    /// bucket only tears its subscription down.
    async fn resubscribe(&self, key: BucketKey) -> SdkResult<()> {
        let room = self
            .inner
            .rooms
            .lock()
            .entry(key.clone())
            .or_default()
            .clone();
        let mut room = room.lock().await;

        // Membership may have changed while waiting for the bucket
        let ids: Vec<String> = {
            let mut buckets = self.inner.buckets.lock();
            match buckets.get(&key) {
                Some(bucket) if bucket.is_empty() => {
                    buckets.remove(&key);
                    Vec::new()
                }
                Some(bucket) => bucket.keys().cloned().collect(),
                None => Vec::new(),
            }
        };

        if ids == room.ids && (room.room_id.is_some() || ids.is_empty()) {
            return Ok(());
        }

        let (index, collection) = &key;
        let realtime = self.inner.sdk.realtime();

        let new_room = if ids.is_empty() {
            None
        } else {
            let filters = json!({ "ids": { "values": ids } });
            let room_id = realtime
                .subscribe(index, collection, filters, SubscribeOptions::default(), self.handler())
                .await?;
            Some(room_id)
        };

        let old_room = std::mem::replace(&mut room.room_id, new_room);
        room.ids = ids;

        if let Some(old_room) = old_room {
            if let Err(e) = realtime.unsubscribe(&old_room).await {
                warn!("Failed to drop room {} of {}:{}: {}", old_room, index, collection, e);
            }
        }

        debug!(
            "Observing {} documents of {}:{}",
            room.ids.len(),
            index,
            collection
        );
        Ok(())
    }

    fn handler(&self) -> NotificationHandler {
        let observer = Arc::downgrade(&self.inner);
        Arc::new(move |notification| {
            if let Some(inner) = Weak::upgrade(&observer) {
                Observer { inner }.on_notification(notification);
            }
        })
    }

    /// Apply a notification to the tracked document it is about
    fn on_notification(&self, notification: Notification) {
        let Some(id) = notification.result.id.as_deref() else {
            return;
        };
        let key = bucket_key(&notification.index, &notification.collection);

        match notification.event {
            NotificationEvent::Write => {
                let document = self
                    .inner
                    .buckets
                    .lock()
                    .get(&key)
                    .and_then(|bucket| bucket.get(id).cloned());
                if let (Some(document), Some(changes)) = (document, notification.result.source) {
                    document.merge(changes);
                }
            }
            NotificationEvent::Delete => {
                let removed = self
                    .inner
                    .buckets
                    .lock()
                    .get_mut(&key)
                    .and_then(|bucket| bucket.remove(id));
                if let Some(document) = removed {
                    document.0.deleted.store(true, Ordering::SeqCst);
                    debug!("Observed document {} was deleted", id);

                    let observer = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = observer.resubscribe(key).await {
                            warn!("Failed to resubscribe after a deletion: {}", e);
                        }
                    });
                }
            }
            _ => {}
        }
    }
}

fn bucket_key(index: &str, collection: &str) -> BucketKey {
    (index.to_string(), collection.to_string())
}

/// Observes every hit of a search
#[derive(Clone)]
pub struct ObservedHits {
    observer: Observer,
    index: String,
    collection: String,
}

#[async_trait]
impl HitMapper for ObservedHits {
    type Output = RealtimeDocument;

    async fn map_hits(&self, hits: &[Hit]) -> SdkResult<Vec<RealtimeDocument>> {
        let documents = hits.iter().cloned().map(Document::from).collect();
        self.observer
            .track(&self.index, &self.collection, documents)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::client::test_support::eventually;
    use crate::config::SdkConfig;
    use crate::error::SdkError;
    use crate::message::NotificationResult;
    use crate::protocol::{MockProtocol, ProtocolEvent};

    /// Answers each subscribe with a fresh room and channel
    fn setup() -> (Sdk, Arc<MockProtocol>) {
        let mock = Arc::new(MockProtocol::new());
        let rooms = Arc::new(AtomicUsize::new(0));
        mock.on_request(move |request| match request.action() {
            Some("subscribe") => {
                let n = rooms.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({ "roomId": format!("room-{}", n), "channel": format!("channel-{}", n) }))
            }
            Some("mGet") => Ok(json!({
                "successes": [
                    { "_id": "t1", "_source": { "status": "free" } },
                    { "_id": "t2", "_source": { "status": "busy" } }
                ],
                "errors": ["t3"]
            })),
            Some("search") => Ok(json!({
                "total": 2,
                "hits": [
                    { "_id": "t1", "_source": { "status": "free" } },
                    { "_id": "t2", "_source": { "status": "busy" } }
                ]
            })),
            _ => Ok(json!({})),
        });
        (Sdk::new(mock.clone(), SdkConfig::default()), mock)
    }

    fn document(id: &str, status: &str) -> Document {
        let mut source = JsonObject::new();
        source.insert("status".into(), json!(status));
        Document::new(id, source)
    }

    fn notification(channel: &str, event: NotificationEvent, id: &str, source: Value) -> ProtocolEvent {
        ProtocolEvent::Notification(Notification {
            index: "nyc".into(),
            collection: "taxis".into(),
            event,
            room: Some(channel.to_string()),
            result: NotificationResult {
                id: Some(id.to_string()),
                source: source.as_object().cloned(),
            },
            ..Notification::default()
        })
    }

    #[tokio::test]
    async fn test_observe_twice_keeps_one_room() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let first = observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        let second = observer
            .observe("nyc", "taxis", document("t1", "busy"))
            .await
            .unwrap();

        assert!(first.same_as(&second));
        assert_eq!(first.get("status"), Some(json!("busy")));
        assert_eq!(observer.observed_count("nyc", "taxis"), 1);
        assert_eq!(observer.bucket_count(), 1);
        assert_eq!(sdk.realtime().subscription_count(), 1);
        assert_eq!(mock.sent_to("realtime", "subscribe").len(), 1);
        let room_id = observer.room_id("nyc", "taxis").await.unwrap();
        assert_eq!(sdk.realtime().server_room_id(&room_id).as_deref(), Some("room-1"));

        let filters = mock.sent_to("realtime", "subscribe")[0].body().cloned().unwrap();
        assert_eq!(filters["ids"]["values"], json!(["t1"]));
    }

    #[tokio::test]
    async fn test_new_member_subscribes_before_unsubscribing() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        observer
            .observe("nyc", "taxis", document("t2", "free"))
            .await
            .unwrap();

        let routes: Vec<String> = mock
            .sent()
            .iter()
            .filter(|r| r.controller() == Some("realtime"))
            .map(|r| r.route())
            .collect();
        assert_eq!(
            routes,
            vec!["realtime:subscribe", "realtime:subscribe", "realtime:unsubscribe"]
        );
        let unsubscribe = &mock.sent_to("realtime", "unsubscribe")[0];
        assert_eq!(unsubscribe.body().unwrap()["roomId"], json!("room-1"));
        assert_eq!(sdk.realtime().subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_write_notification_updates_every_handle() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let taxi = observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        let held_elsewhere = taxi.clone();

        mock.emit(notification(
            "channel-1",
            NotificationEvent::Write,
            "t1",
            json!({ "status": "busy", "driver": "ada" }),
        ));

        assert!(eventually(|| held_elsewhere.get("status") == Some(json!("busy"))).await);
        assert_eq!(taxi.get("driver"), Some(json!("ada")));
        assert!(!taxi.is_deleted());
        assert_eq!(observer.observed_count("nyc", "taxis"), 1);
    }

    #[tokio::test]
    async fn test_delete_of_last_document_tears_down() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let taxi = observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();

        mock.emit(notification("channel-1", NotificationEvent::Delete, "t1", json!(null)));

        assert!(eventually(|| taxi.is_deleted()).await);
        assert!(eventually(|| mock.sent_to("realtime", "unsubscribe").len() == 1).await);
        assert_eq!(observer.observed_count("nyc", "taxis"), 0);
        assert_eq!(observer.bucket_count(), 0);
        assert_eq!(sdk.realtime().subscription_count(), 0);
        assert_eq!(mock.sent_to("realtime", "subscribe").len(), 1);
        assert!(observer.room_id("nyc", "taxis").await.is_none());
    }

    #[tokio::test]
    async fn test_publish_notification_changes_nothing() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());
        let taxi = observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();

        mock.emit(notification(
            "channel-1",
            NotificationEvent::Publish,
            "t1",
            json!({ "status": "busy" }),
        ));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(taxi.get("status"), Some(json!("free")));
    }

    #[tokio::test]
    async fn test_search_observes_hits_with_one_subscription() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let result = observer
            .search("nyc", "taxis", JsonObject::new(), SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.hits[1].get("status"), Some(json!("busy")));
        assert_eq!(observer.observed_count("nyc", "taxis"), 2);
        assert_eq!(mock.sent_to("realtime", "subscribe").len(), 1);
    }

    #[tokio::test]
    async fn test_stop_granularities() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        observer
            .observe("nyc", "taxis", document("t2", "free"))
            .await
            .unwrap();
        observer
            .observe("nyc", "drivers", document("d1", "idle"))
            .await
            .unwrap();

        observer
            .stop_documents("nyc", "taxis", &["t1".to_string()])
            .await
            .unwrap();
        assert_eq!(observer.observed_count("nyc", "taxis"), 1);
        assert_eq!(sdk.realtime().subscription_count(), 2);

        observer.stop_collection("nyc", "drivers").await.unwrap();
        assert_eq!(observer.bucket_count(), 1);
        assert_eq!(sdk.realtime().subscription_count(), 1);

        observer.stop_all().await.unwrap();
        assert_eq!(observer.bucket_count(), 0);
        assert_eq!(sdk.realtime().subscription_count(), 0);

        let subscribes = mock.sent_to("realtime", "subscribe").len();
        let unsubscribes = mock.sent_to("realtime", "unsubscribe").len();
        assert_eq!(subscribes, unsubscribes);
    }

    /// Rooms named after the observed ids, as a backend shares rooms
    /// between identical filters
    fn shared_rooms(mock: &MockProtocol) {
        mock.on_request(|request| match request.action() {
            Some("subscribe") => {
                let ids = request
                    .body()
                    .and_then(|body| body["ids"]["values"].as_array().cloned())
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(json!({ "roomId": format!("room-{}", ids), "channel": format!("channel-{}", ids) }))
            }
            _ => Ok(json!({})),
        });
    }

    #[tokio::test]
    async fn test_two_observers_of_one_document_stay_independent() {
        let (sdk, mock) = setup();
        shared_rooms(&mock);
        sdk.connect().await.unwrap();
        let first = Observer::new(sdk.clone());
        let second = Observer::new(sdk.clone());

        let a = first
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        let b = second
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();
        assert_eq!(sdk.realtime().subscription_count(), 2);

        mock.emit(notification("channel-t1", NotificationEvent::Write, "t1", json!({ "status": "busy" })));
        assert!(eventually(|| a.get("status") == Some(json!("busy"))).await);
        assert!(eventually(|| b.get("status") == Some(json!("busy"))).await);

        // The backend room is still needed by the first observer
        second.stop_all().await.unwrap();
        assert_eq!(sdk.realtime().subscription_count(), 1);
        assert!(mock.sent_to("realtime", "unsubscribe").is_empty());

        mock.emit(notification("channel-t1", NotificationEvent::Write, "t1", json!({ "status": "off" })));
        assert!(eventually(|| a.get("status") == Some(json!("off"))).await);
        assert_eq!(b.get("status"), Some(json!("busy")));

        first.stop_all().await.unwrap();
        assert_eq!(sdk.realtime().subscription_count(), 0);
        assert_eq!(mock.sent_to("realtime", "unsubscribe").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_subscription_untracks_new_documents() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());
        let taxi = observer
            .observe("nyc", "taxis", document("t1", "free"))
            .await
            .unwrap();

        mock.on_request(|request| match request.action() {
            Some("subscribe") => Err(SdkError::Api {
                status: 403,
                message: "Forbidden".into(),
                id: None,
            }),
            _ => Ok(json!({})),
        });

        assert!(observer
            .observe("nyc", "drivers", document("d1", "idle"))
            .await
            .is_err());
        assert_eq!(observer.observed_count("nyc", "drivers"), 0);
        assert_eq!(observer.bucket_count(), 1);

        // Re-observed documents stay tracked, new ones are dropped
        let docs = vec![document("t1", "busy"), document("t2", "free")];
        assert!(observer.track("nyc", "taxis", docs).await.is_err());
        assert_eq!(observer.observed_count("nyc", "taxis"), 1);
        assert!(!taxi.is_deleted());
        assert_eq!(sdk.realtime().subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_m_get_resubscribes_once() {
        let (sdk, mock) = setup();
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let ids = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        let result = observer.m_get("nyc", "taxis", &ids).await.unwrap();

        assert_eq!(result.successes.len(), 2);
        assert_eq!(result.errors, vec!["t3"]);
        assert_eq!(observer.observed_count("nyc", "taxis"), 2);

        let subscribes = mock.sent_to("realtime", "subscribe");
        assert_eq!(subscribes.len(), 1);
        assert_eq!(subscribes[0].body().unwrap()["ids"]["values"], json!(["t1", "t2"]));
    }

    #[tokio::test]
    async fn test_m_get_without_successes_never_subscribes() {
        let (sdk, mock) = setup();
        mock.on_request(|request| match request.action() {
            Some("mGet") => Ok(json!({ "successes": [], "errors": ["t1"] })),
            _ => Ok(json!({})),
        });
        sdk.connect().await.unwrap();
        let observer = Observer::new(sdk.clone());

        let result = observer
            .m_get("nyc", "taxis", &["t1".to_string()])
            .await
            .unwrap();

        assert!(result.successes.is_empty());
        assert!(mock.sent_to("realtime", "subscribe").is_empty());
        assert_eq!(observer.bucket_count(), 0);
        assert!(observer.room_id("nyc", "taxis").await.is_none());
    }
}
