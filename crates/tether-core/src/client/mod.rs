//! SDK client
//!
//! [`Sdk`] is a cheap, cloneable handle on one SDK instance. It owns the
//! transport, the offline queue, the connection state and the realtime
//! subscriptions. Requests go through the query dispatcher (`dispatch`),
//! transport events through the connection state machine (`connection`).
//!
//! ```ignore
//! let protocol = Arc::new(WebSocketProtocol::new("ws://localhost:7512", config.websocket.clone()));
//! let sdk = Sdk::new(protocol, config);
//! sdk.connect().await?;
//!
//! let response = sdk.query(json!({ "controller": "server", "action": "now" }), QueryOptions::default()).await?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};

use crate::config::{SdkConfig, Timeout};
use crate::controllers::{
    AuthController, Controller, ControllerRegistry, DocumentController, NamedController,
    RealtimeController, RoomRegistry,
};
use crate::error::SdkResult;
use crate::events::{EventEmitter, SdkEvent};
use crate::message::Request;
use crate::protocol::Protocol;
use crate::queue::OfflineQueue;

mod connection;
mod dispatch;
mod state;

pub use state::{ConnectionState, ConnectionStatus};

/// Obtains a fresh authentication token, typically by calling `auth().login(..)`
pub type Authenticator = Arc<dyn Fn(Sdk) -> BoxFuture<'static, SdkResult<()>> + Send + Sync>;

/// Decides whether a request may wait in the offline queue
pub type QueueFilter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Restores persisted requests in front of the offline queue before a replay
pub type QueueLoader = Arc<dyn Fn() -> BoxFuture<'static, SdkResult<Vec<Request>>> + Send + Sync>;

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// `Some(false)` forbids queuing this request while offline
    pub queuable: Option<bool>,
    /// Overrides the SDK-wide request timeout
    pub timeout: Option<Timeout>,
    /// Copied onto the request as `refresh` unless already present
    pub refresh: Option<String>,
    /// Copied onto the request as `retryOnConflict` unless already present
    pub retry_on_conflict: Option<u32>,
}

impl QueryOptions {
    /// Options for a request that must never wait in the offline queue
    pub fn not_queuable() -> Self {
        Self {
            queuable: Some(false),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub(crate) struct SdkInner {
    pub(crate) protocol: Arc<dyn Protocol>,
    pub(crate) config: SdkConfig,
    pub(crate) instance_id: String,
    pub(crate) state: ConnectionState,
    pub(crate) status_tx: watch::Sender<ConnectionStatus>,
    pub(crate) status_rx: watch::Receiver<ConnectionStatus>,
    pub(crate) events: EventEmitter,
    pub(crate) queue: Mutex<OfflineQueue>,
    pub(crate) jwt: RwLock<Option<String>>,
    pub(crate) authenticator: RwLock<Option<Authenticator>>,
    pub(crate) queue_filter: RwLock<Option<QueueFilter>>,
    pub(crate) queue_loader: RwLock<Option<QueueLoader>>,
    pub(crate) controllers: RwLock<ControllerRegistry>,
    pub(crate) rooms: RoomRegistry,
    /// Transport listeners registered
    pub(crate) listening: AtomicBool,
    /// A queue replay is running
    pub(crate) replaying: AtomicBool,
}

/// Handle on one SDK instance
#[derive(Clone)]
pub struct Sdk {
    pub(crate) inner: Arc<SdkInner>,
}

impl std::fmt::Debug for Sdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sdk")
            .field("protocol", &self.inner.protocol.name())
            .field("instance_id", &self.inner.instance_id)
            .field("status", &self.status())
            .finish()
    }
}

impl Sdk {
    /// Create an SDK instance on top of a transport
    pub fn new(protocol: Arc<dyn Protocol>, config: SdkConfig) -> Self {
        let config = config.normalized();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let mut controllers = ControllerRegistry::new();
        for name in [AuthController::NAME, DocumentController::NAME, RealtimeController::NAME] {
            // Built-in names are distinct
            let _ = controllers.register(Arc::new(NamedController::new(name)));
        }

        let instance_id = format!("tether-{}", &uuid::Uuid::new_v4().to_string()[..8]);

        Self {
            inner: Arc::new(SdkInner {
                protocol,
                instance_id,
                state: ConnectionState::new(),
                status_tx,
                status_rx,
                events: EventEmitter::new(config.event_timeout()),
                queue: Mutex::new(OfflineQueue::new(config.queue_ttl(), config.queue_max_size())),
                jwt: RwLock::new(None),
                authenticator: RwLock::new(None),
                queue_filter: RwLock::new(None),
                queue_loader: RwLock::new(None),
                controllers: RwLock::new(controllers),
                rooms: RoomRegistry::new(),
                listening: AtomicBool::new(false),
                replaying: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    /// Identifier sent as `volatile.sdkInstanceId` with every request
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.inner.protocol
    }

    /// Get the current status
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_rx.clone()
    }

    /// Subscribe to SDK events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SdkEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.state.is_logged_in()
    }

    /// The authentication token attached to requests
    pub fn jwt(&self) -> Option<String> {
        self.inner.jwt.read().clone()
    }

    pub fn set_jwt(&self, jwt: Option<String>) {
        *self.inner.jwt.write() = jwt;
    }

    pub fn set_authenticator(&self, authenticator: Authenticator) {
        *self.inner.authenticator.write() = Some(authenticator);
    }

    pub fn set_queue_filter(&self, filter: QueueFilter) {
        *self.inner.queue_filter.write() = Some(filter);
    }

    pub fn set_queue_loader(&self, loader: QueueLoader) {
        *self.inner.queue_loader.write() = Some(loader);
    }

    /// Register an additional controller
    ///
    /// Fails if a controller with the same name already exists.
    pub fn use_controller(&self, controller: Arc<dyn Controller>) -> SdkResult<()> {
        self.inner.controllers.write().register(controller)
    }

    pub fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.inner.controllers.read().get(name)
    }

    pub fn auth(&self) -> AuthController<'_> {
        AuthController::new(self)
    }

    pub fn document(&self) -> DocumentController<'_> {
        DocumentController::new(self)
    }

    pub fn realtime(&self) -> RealtimeController<'_> {
        RealtimeController::new(self)
    }

    pub(crate) fn emit(&self, event: SdkEvent) {
        self.inner.events.emit(event);
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        let _ = self.inner.status_tx.send(status);
    }
}
