//! `realtime` controller
//!
//! Subscriptions are tracked in a [`RoomRegistry`] so notifications can be
//! routed to their handler and subscriptions renewed after a reconnection.
//! Callers address subscriptions by an id the SDK generates, not by the
//! backend room id, which identical filters share.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{QueryOptions, Sdk};
use crate::error::{SdkError, SdkResult};
use crate::message::{keys, JsonObject, Notification, Request};

/// Receives the notifications of one subscription, in transport order
///
/// Handlers run on the SDK's event loop and must not block it.
pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// Subscription options
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    /// `all`, `in`, `out` or `none`
    pub scope: Option<String>,
    /// `all`, `in`, `out` or `none`
    pub users: Option<String>,
    /// Receive notifications triggered by this SDK instance
    pub subscribe_to_self: bool,
    pub volatile: Option<JsonObject>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            scope: None,
            users: None,
            subscribe_to_self: true,
            volatile: None,
        }
    }
}

#[derive(Clone)]
struct Room {
    /// Room id the backend currently knows the subscription by
    server_id: String,
    channel: String,
    index: String,
    collection: String,
    filters: Value,
    options: SubscribeOptions,
    handler: NotificationHandler,
}

/// What releasing a subscription requires from the backend
enum Release {
    /// Other subscriptions still share the backend room; the entry is gone
    Shared,
    /// Last holder of the backend room; the entry stays until the backend
    /// confirms the unsubscription
    Last(String),
    Unknown,
}

/// Live subscriptions, keyed by the subscription id handed out to callers
///
/// The backend gives identical filters the same room, so several
/// subscriptions may point at one backend room. Each keeps its own handler.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    /// Hand a notification to the handlers listening on its channel
    ///
    /// Returns the number of handlers called.
    pub fn dispatch(&self, notification: &Notification, instance_id: &str) -> usize {
        let Some(channel) = notification.room.as_deref() else {
            return 0;
        };
        let from_self = notification
            .volatile
            .as_ref()
            .and_then(|v| v.get(keys::SDK_INSTANCE_ID))
            .and_then(Value::as_str)
            == Some(instance_id);

        let handlers: Vec<NotificationHandler> = self
            .rooms
            .read()
            .values()
            .filter(|room| room.channel == channel)
            .filter(|room| room.options.subscribe_to_self || !from_self)
            .map(|room| room.handler.clone())
            .collect();

        for handler in &handlers {
            handler(notification.clone());
        }
        handlers.len()
    }

    fn insert(&self, subscription_id: String, room: Room) {
        self.rooms.write().insert(subscription_id, room);
    }

    fn remove(&self, subscription_id: &str) -> Option<Room> {
        self.rooms.write().remove(subscription_id)
    }

    fn server_id(&self, subscription_id: &str) -> Option<String> {
        self.rooms
            .read()
            .get(subscription_id)
            .map(|room| room.server_id.clone())
    }

    /// Drop a subscription locally if another one still holds its room
    fn release(&self, subscription_id: &str) -> Release {
        let mut rooms = self.rooms.write();
        let Some(server_id) = rooms.get(subscription_id).map(|room| room.server_id.clone()) else {
            return Release::Unknown;
        };
        let shared = rooms
            .iter()
            .any(|(id, room)| id != subscription_id && room.server_id == server_id);
        if shared {
            rooms.remove(subscription_id);
            Release::Shared
        } else {
            Release::Last(server_id)
        }
    }

    /// Live subscriptions grouped by backend room
    fn by_server_room(&self) -> Vec<(Room, Vec<String>)> {
        let mut groups: HashMap<String, (Room, Vec<String>)> = HashMap::new();
        for (id, room) in self.rooms.read().iter() {
            groups
                .entry(room.server_id.clone())
                .or_insert_with(|| (room.clone(), Vec::new()))
                .1
                .push(id.clone());
        }
        groups.into_values().collect()
    }

    fn update(&self, subscription_ids: &[String], server_id: &str, channel: &str) {
        let mut rooms = self.rooms.write();
        for id in subscription_ids {
            if let Some(room) = rooms.get_mut(id) {
                room.server_id = server_id.to_string();
                room.channel = channel.to_string();
            }
        }
    }
}

/// Room and channel returned by a subscription
struct Subscription {
    room_id: String,
    channel: String,
}

/// Borrowed view on the `realtime` controller
pub struct RealtimeController<'a> {
    sdk: &'a Sdk,
}

impl<'a> RealtimeController<'a> {
    pub const NAME: &'static str = "realtime";

    pub fn new(sdk: &'a Sdk) -> Self {
        Self { sdk }
    }

    /// Subscribe to documents of a collection matching `filters`
    ///
    /// Returns the subscription id to pass to [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe(
        &self,
        index: &str,
        collection: &str,
        filters: Value,
        options: SubscribeOptions,
        handler: NotificationHandler,
    ) -> SdkResult<String> {
        let subscription = self.send_subscribe(index, collection, &filters, &options).await?;
        let subscription_id = Uuid::new_v4().to_string();

        debug!(
            "Subscribed to {}:{} in room {} ({})",
            index, collection, subscription.room_id, subscription_id
        );
        self.sdk.inner.rooms.insert(
            subscription_id.clone(),
            Room {
                server_id: subscription.room_id,
                channel: subscription.channel,
                index: index.to_string(),
                collection: collection.to_string(),
                filters,
                options,
                handler,
            },
        );
        Ok(subscription_id)
    }

    /// Drop a subscription
    ///
    /// The backend room is only left once no other subscription of this SDK
    /// instance uses it. If the backend refuses, the subscription stays live.
    pub async fn unsubscribe(&self, subscription_id: &str) -> SdkResult<()> {
        let server_id = match self.sdk.inner.rooms.release(subscription_id) {
            Release::Unknown => {
                return Err(SdkError::InvalidArgument(format!(
                    "not subscribed to {}",
                    subscription_id
                )))
            }
            Release::Shared => {
                debug!("Dropped subscription {}, its room is still in use", subscription_id);
                return Ok(());
            }
            Release::Last(server_id) => server_id,
        };

        let request = Request::new(Self::NAME, "unsubscribe")
            .with(keys::BODY, json!({ "roomId": server_id }));
        self.sdk.send_request(request, QueryOptions::default()).await?;
        self.sdk.inner.rooms.remove(subscription_id);
        debug!("Unsubscribed from room {}", server_id);
        Ok(())
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.sdk.inner.rooms.len()
    }

    /// Backend room currently serving a subscription
    pub fn server_room_id(&self, subscription_id: &str) -> Option<String> {
        self.sdk.inner.rooms.server_id(subscription_id)
    }

    /// Subscribe again to every live room, after the connection came back
    ///
    /// Each backend room is renewed once, whatever the number of
    /// subscriptions sharing it. Subscription ids stay valid. Failures are
    /// logged and the remaining rooms are still renewed. Returns the number
    /// of subscriptions renewed.
    pub async fn renew_subscriptions(&self) -> usize {
        let mut renewed = 0;
        for (room, subscription_ids) in self.sdk.inner.rooms.by_server_room() {
            match self
                .send_subscribe(&room.index, &room.collection, &room.filters, &room.options)
                .await
            {
                Ok(subscription) => {
                    self.sdk.inner.rooms.update(
                        &subscription_ids,
                        &subscription.room_id,
                        &subscription.channel,
                    );
                    renewed += subscription_ids.len();
                }
                Err(e) => warn!("Failed to renew room {}: {}", room.server_id, e),
            }
        }
        renewed
    }

    async fn send_subscribe(
        &self,
        index: &str,
        collection: &str,
        filters: &Value,
        options: &SubscribeOptions,
    ) -> SdkResult<Subscription> {
        let mut request = Request::new(Self::NAME, "subscribe")
            .with(keys::INDEX, index)
            .with(keys::COLLECTION, collection)
            .with(keys::BODY, filters.clone());
        if let Some(scope) = &options.scope {
            request.set("scope", scope.as_str());
        }
        if let Some(users) = &options.users {
            request.set("users", users.as_str());
        }
        if let Some(volatile) = &options.volatile {
            request.set(keys::VOLATILE, Value::Object(volatile.clone()));
        }

        let response = self.sdk.send_request(request, QueryOptions::default()).await?;
        let field = |name: &str| {
            response
                .result
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SdkError::Protocol(format!("subscribe response carries no {}", name)))
        };
        Ok(Subscription {
            room_id: field("roomId")?,
            channel: field("channel")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::SdkConfig;
    use crate::message::NotificationEvent;
    use crate::protocol::MockProtocol;

    fn setup() -> (Sdk, Arc<MockProtocol>) {
        let mock = Arc::new(MockProtocol::new());
        mock.set_ready(true);
        mock.on_request(|request| match request.action() {
            Some("subscribe") => Ok(json!({ "roomId": "room-1", "channel": "channel-1" })),
            _ => Ok(json!({})),
        });
        (Sdk::new(mock.clone(), SdkConfig::default()), mock)
    }

    fn counting_handler() -> (NotificationHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handler: NotificationHandler = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    fn notification(channel: &str, volatile: Option<Value>) -> Notification {
        Notification {
            room: Some(channel.to_string()),
            event: NotificationEvent::Write,
            volatile,
            ..Notification::default()
        }
    }

    #[tokio::test]
    async fn test_subscribe_routes_notifications() {
        let (sdk, mock) = setup();
        let (handler, count) = counting_handler();

        let room_id = sdk
            .realtime()
            .subscribe(
                "nyc",
                "taxis",
                json!({ "equals": { "status": "free" } }),
                SubscribeOptions::default(),
                handler,
            )
            .await
            .unwrap();
        assert_eq!(sdk.realtime().server_room_id(&room_id).as_deref(), Some("room-1"));
        assert_eq!(sdk.realtime().subscription_count(), 1);

        let rooms = &sdk.inner.rooms;
        assert_eq!(rooms.dispatch(&notification("channel-1", None), sdk.instance_id()), 1);
        assert_eq!(rooms.dispatch(&notification("channel-2", None), sdk.instance_id()), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let sent = &mock.sent_to("realtime", "subscribe")[0];
        assert_eq!(sent.body().unwrap()["equals"]["status"], json!("free"));
    }

    #[tokio::test]
    async fn test_own_notifications_can_be_skipped() {
        let (sdk, _mock) = setup();
        let (handler, count) = counting_handler();
        let options = SubscribeOptions {
            subscribe_to_self: false,
            ..SubscribeOptions::default()
        };
        sdk.realtime()
            .subscribe("nyc", "taxis", json!({}), options, handler)
            .await
            .unwrap();

        let own = json!({ "sdkInstanceId": sdk.instance_id() });
        let other = json!({ "sdkInstanceId": "someone-else" });
        sdk.inner
            .rooms
            .dispatch(&notification("channel-1", Some(own)), sdk.instance_id());
        sdk.inner
            .rooms
            .dispatch(&notification("channel-1", Some(other)), sdk.instance_id());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_forgets_room() {
        let (sdk, mock) = setup();
        let (handler, _count) = counting_handler();
        let room_id = sdk
            .realtime()
            .subscribe("nyc", "taxis", json!({}), SubscribeOptions::default(), handler)
            .await
            .unwrap();

        sdk.realtime().unsubscribe(&room_id).await.unwrap();

        assert_eq!(sdk.realtime().subscription_count(), 0);
        let sent = &mock.sent_to("realtime", "unsubscribe")[0];
        assert_eq!(sent.body().unwrap()["roomId"], json!("room-1"));
    }

    #[tokio::test]
    async fn test_renew_keeps_caller_room_id() {
        let (sdk, mock) = setup();
        let (handler, count) = counting_handler();
        let room_id = sdk
            .realtime()
            .subscribe("nyc", "taxis", json!({}), SubscribeOptions::default(), handler)
            .await
            .unwrap();

        mock.on_request(|_| Ok(json!({ "roomId": "room-9", "channel": "channel-9" })));
        assert_eq!(sdk.realtime().renew_subscriptions().await, 1);

        sdk.inner
            .rooms
            .dispatch(&notification("channel-9", None), sdk.instance_id());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sdk.realtime().unsubscribe(&room_id).await.unwrap();
        let sent = &mock.sent_to("realtime", "unsubscribe")[0];
        assert_eq!(sent.body().unwrap()["roomId"], json!("room-9"));
    }

    #[tokio::test]
    async fn test_identical_filters_keep_both_handlers() {
        let (sdk, mock) = setup();
        let (first_handler, first_count) = counting_handler();
        let (second_handler, second_count) = counting_handler();
        let filters = json!({ "ids": { "values": ["t1"] } });

        let first = sdk
            .realtime()
            .subscribe("nyc", "taxis", filters.clone(), SubscribeOptions::default(), first_handler)
            .await
            .unwrap();
        let second = sdk
            .realtime()
            .subscribe("nyc", "taxis", filters, SubscribeOptions::default(), second_handler)
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(sdk.realtime().subscription_count(), 2);

        let rooms = &sdk.inner.rooms;
        assert_eq!(rooms.dispatch(&notification("channel-1", None), sdk.instance_id()), 2);
        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);

        // The backend room is still used by the second subscription
        sdk.realtime().unsubscribe(&first).await.unwrap();
        assert!(mock.sent_to("realtime", "unsubscribe").is_empty());
        assert_eq!(rooms.dispatch(&notification("channel-1", None), sdk.instance_id()), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 2);

        sdk.realtime().unsubscribe(&second).await.unwrap();
        assert_eq!(mock.sent_to("realtime", "unsubscribe").len(), 1);
        assert_eq!(sdk.realtime().subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_sends_one_subscribe_per_room() {
        let (sdk, mock) = setup();
        for _ in 0..2 {
            let (handler, _count) = counting_handler();
            sdk.realtime()
                .subscribe("nyc", "taxis", json!({}), SubscribeOptions::default(), handler)
                .await
                .unwrap();
        }
        mock.clear_sent();

        assert_eq!(sdk.realtime().renew_subscriptions().await, 2);
        assert_eq!(mock.sent_to("realtime", "subscribe").len(), 1);
    }

    #[tokio::test]
    async fn test_refused_unsubscribe_keeps_subscription() {
        let (sdk, mock) = setup();
        let (handler, count) = counting_handler();
        let room_id = sdk
            .realtime()
            .subscribe("nyc", "taxis", json!({}), SubscribeOptions::default(), handler)
            .await
            .unwrap();

        mock.on_request(|_| {
            Err(SdkError::Api {
                status: 500,
                message: "internal error".into(),
                id: None,
            })
        });
        assert!(sdk.realtime().unsubscribe(&room_id).await.is_err());

        assert_eq!(sdk.realtime().subscription_count(), 1);
        sdk.inner
            .rooms
            .dispatch(&notification("channel-1", None), sdk.instance_id());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_id_fails() {
        let (sdk, mock) = setup();

        let err = sdk.realtime().unsubscribe("nope").await.unwrap_err();

        assert!(matches!(err, SdkError::InvalidArgument(_)));
        assert!(mock.sent().is_empty());
    }
}
