//! In-memory transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::{Protocol, ProtocolEvent, PROTOCOL_EVENT_CAPACITY};
use crate::error::{SdkError, SdkResult};
use crate::message::{Request, Response};

type Responder = Box<dyn FnMut(&Request) -> SdkResult<Value> + Send>;

/// A transport that answers requests from a closure
///
/// Every request that reaches the transport is recorded, in order. Tests
/// drive connection changes by calling [`MockProtocol::emit`].
pub struct MockProtocol {
    ready: AtomicBool,
    sent: Mutex<Vec<Request>>,
    responder: Mutex<Responder>,
    latency: Mutex<Option<Duration>>,
    events: broadcast::Sender<ProtocolEvent>,
}

impl Default for MockProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProtocol {
    /// Create a disconnected mock answering `{}` to everything
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(PROTOCOL_EVENT_CAPACITY);
        Self {
            ready: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(|_| Ok(json!({})))),
            latency: Mutex::new(None),
            events,
        }
    }

    /// Answer requests with the given closure
    pub fn on_request<F>(&self, responder: F)
    where
        F: FnMut(&Request) -> SdkResult<Value> + Send + 'static,
    {
        *self.responder.lock() = Box::new(responder);
    }

    /// Delay every response
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Inject a transport event
    pub fn emit(&self, event: ProtocolEvent) {
        let _ = self.events.send(event);
    }

    /// Every request that reached the transport, in order
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }

    /// Requests that reached the transport for a given `controller:action`
    pub fn sent_to(&self, controller: &str, action: &str) -> Vec<Request> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.controller() == Some(controller) && r.action() == Some(action))
            .cloned()
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Protocol for MockProtocol {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> SdkResult<()> {
        self.set_ready(true);
        self.emit(ProtocolEvent::Connect);
        Ok(())
    }

    async fn close(&self) {
        self.set_ready(false);
        self.emit(ProtocolEvent::Disconnect);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &Request) -> SdkResult<Response> {
        if !self.is_ready() {
            return Err(SdkError::NotConnected(format!(
                "mock transport is offline, cannot send {}",
                request.route()
            )));
        }

        self.sent.lock().push(request.clone());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut responder = self.responder.lock();
            (&mut **responder)(request)
        }?;
        Ok(Response::ok(request.request_id(), result))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }
}
