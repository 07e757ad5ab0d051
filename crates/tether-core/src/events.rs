//! SDK events
//!
//! Events are published on a broadcast channel. Protected events are
//! rate-limited: the emitter remembers when each protected event was last
//! sent and drops repeats inside the configured event timeout window.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::message::Request;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the SDK
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    /// Connected to the backend for the first time
    Connected,
    /// The connection was closed
    Disconnected,
    /// The connection was re-established
    Reconnected,
    /// Re-authentication after a reconnection failed
    ReconnectionError(String),
    /// The transport reported a network failure
    NetworkError(String),
    /// A request was added to the offline queue
    OfflineQueuePush(Request),
    /// A request left the offline queue (replayed or evicted)
    OfflineQueuePop(Request),
    /// A request was rejected because the SDK is offline
    Discarded(Request),
    /// The authentication token expired
    TokenExpired,
    /// A new token was obtained after the previous one expired
    ReAuthenticated,
    /// A request failed at the transport level
    QueryError { error: String, request: Request },
    /// Outcome of a login
    LoginAttempt {
        success: bool,
        error: Option<String>,
    },
}

impl SdkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SdkEvent::Connected => "connected",
            SdkEvent::Disconnected => "disconnected",
            SdkEvent::Reconnected => "reconnected",
            SdkEvent::ReconnectionError(_) => "reconnectionError",
            SdkEvent::NetworkError(_) => "networkError",
            SdkEvent::OfflineQueuePush(_) => "offlineQueuePush",
            SdkEvent::OfflineQueuePop(_) => "offlineQueuePop",
            SdkEvent::Discarded(_) => "discarded",
            SdkEvent::TokenExpired => "tokenExpired",
            SdkEvent::ReAuthenticated => "reAuthenticated",
            SdkEvent::QueryError { .. } => "queryError",
            SdkEvent::LoginAttempt { .. } => "loginAttempt",
        }
    }

    /// Protected events are emitted at most once per event timeout window
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            SdkEvent::Connected
                | SdkEvent::Disconnected
                | SdkEvent::Reconnected
                | SdkEvent::TokenExpired
                | SdkEvent::LoginAttempt { .. }
        )
    }
}

/// Timestamp-gated event dispatcher
pub struct EventEmitter {
    tx: broadcast::Sender<SdkEvent>,
    last_emitted: Mutex<HashMap<&'static str, Instant>>,
    event_timeout: Duration,
}

impl EventEmitter {
    pub fn new(event_timeout: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            last_emitted: Mutex::new(HashMap::new()),
            event_timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Returns false if a protected event was throttled.
    pub fn emit(&self, event: SdkEvent) -> bool {
        if event.is_protected() {
            let now = Instant::now();
            let mut last = self.last_emitted.lock();
            if let Some(at) = last.get(event.name()) {
                if now.duration_since(*at) < self.event_timeout {
                    debug!("Throttled protected event {}", event.name());
                    return false;
                }
            }
            last.insert(event.name(), now);
        }

        // No receivers is not an error
        let _ = self.tx.send(event);
        true
    }
}
