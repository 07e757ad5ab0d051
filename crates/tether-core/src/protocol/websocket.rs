//! WebSocket transport
//!
//! A background task owns the socket and reconnects with exponential
//! backoff. Requests are JSON text frames; responses are matched to pending
//! requests by `requestId`, every other frame carrying a `room` is a
//! realtime notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Protocol, ProtocolEvent, PROTOCOL_EVENT_CAPACITY};
use crate::config::WebSocketConfig;
use crate::error::{SdkError, SdkResult};
use crate::message::{keys, Notification, NotificationType, Request, Response};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = HashMap<String, oneshot::Sender<SdkResult<Response>>>;

/// Commands sent to the connection task
#[derive(Debug)]
enum Command {
    /// Write a text frame
    Send(String),
    /// Close the socket and stop reconnecting
    Shutdown,
}

/// How a live connection ended
enum Closed {
    /// We asked for it
    Shutdown,
    /// The server went away
    Remote,
}

/// State shared between the protocol handle and its connection task
struct Shared {
    url: String,
    config: WebSocketConfig,
    ready: AtomicBool,
    events: broadcast::Sender<ProtocolEvent>,
    pending: Mutex<PendingMap>,
}

impl Shared {
    fn emit(&self, event: ProtocolEvent) {
        let _ = self.events.send(event);
    }

    /// Fail every request still waiting for an answer
    fn fail_pending(&self, reason: &str) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            debug!("Failing {} pending requests: {}", pending.len(), reason);
        }
        for (_, tx) in pending {
            let _ = tx.send(Err(SdkError::Network(reason.to_string())));
        }
    }

    /// Dispatch one incoming text frame
    fn route_frame(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to decode frame: {}", e);
                return;
            }
        };

        let waiting = value
            .get(keys::REQUEST_ID)
            .and_then(Value::as_str)
            .and_then(|id| self.pending.lock().remove(id));

        if let Some(tx) = waiting {
            let response = serde_json::from_value::<Response>(value).map_err(SdkError::from);
            let _ = tx.send(response);
            return;
        }

        if value.get("room").is_none() && value.get("type").is_none() {
            debug!("Dropping unrouted frame");
            return;
        }

        match serde_json::from_value::<Notification>(value) {
            Ok(n) if n.kind == NotificationType::TokenExpired => {
                self.emit(ProtocolEvent::TokenExpired);
            }
            Ok(n) => self.emit(ProtocolEvent::Notification(n)),
            Err(e) => warn!("Failed to decode notification: {}", e),
        }
    }
}

/// JSON-over-WebSocket transport
pub struct WebSocketProtocol {
    shared: Arc<Shared>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl WebSocketProtocol {
    pub fn new(url: &str, config: WebSocketConfig) -> Self {
        let (events, _rx) = broadcast::channel(PROTOCOL_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                url: url.to_string(),
                config,
                ready: AtomicBool::new(false),
                events,
                pending: Mutex::new(HashMap::new()),
            }),
            command_tx: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }
}

#[async_trait]
impl Protocol for WebSocketProtocol {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn connect(&self) -> SdkResult<()> {
        let (first_tx, first_rx) = oneshot::channel();
        {
            let mut command_tx = self.command_tx.lock();
            if command_tx.as_ref().is_some_and(|tx| !tx.is_closed()) {
                // Task already running
                return Ok(());
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *command_tx = Some(tx);
            tokio::spawn(connection_task(self.shared.clone(), rx, first_tx));
        }

        first_rx
            .await
            .unwrap_or_else(|_| Err(SdkError::Network("connection task stopped".to_string())))
    }

    async fn close(&self) {
        let command_tx = self.command_tx.lock().take();
        match command_tx {
            Some(tx) => {
                let _ = tx.send(Command::Shutdown);
            }
            None => self.shared.ready.store(false, Ordering::SeqCst),
        }
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &Request) -> SdkResult<Response> {
        if !self.is_ready() {
            self.shared.emit(ProtocolEvent::Discarded(request.clone()));
            return Err(SdkError::NotConnected(format!(
                "not connected to {}",
                self.shared.url
            )));
        }

        let request_id = request
            .request_id()
            .ok_or_else(|| SdkError::Protocol("request has no requestId".to_string()))?
            .to_string();
        let frame = serde_json::to_string(request)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id.clone(), tx);

        let sent = self
            .command_tx
            .lock()
            .as_ref()
            .is_some_and(|cmd| cmd.send(Command::Send(frame)).is_ok());
        if !sent {
            self.shared.pending.lock().remove(&request_id);
            return Err(SdkError::NotConnected("connection task stopped".to_string()));
        }

        let response = rx
            .await
            .unwrap_or_else(|_| Err(SdkError::Network("connection dropped".to_string())))?;
        response.into_result()
    }

    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.shared.events.subscribe()
    }
}

/// Connection loop with reconnection
async fn connection_task(
    shared: Arc<Shared>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    first_tx: oneshot::Sender<SdkResult<()>>,
) {
    let mut first_tx = Some(first_tx);
    let mut connected_once = false;
    let mut reconnect_delay = shared.config.initial_reconnect_delay();

    loop {
        debug!("Connecting to {}", shared.url);
        match connect_with_timeout(&shared).await {
            Ok(ws_stream) => {
                shared.ready.store(true, Ordering::SeqCst);
                if let Some(tx) = first_tx.take() {
                    let _ = tx.send(Ok(()));
                }

                if connected_once {
                    info!("Reconnected to {}", shared.url);
                    shared.emit(ProtocolEvent::Reconnect);
                } else {
                    info!("Connected to {}", shared.url);
                    shared.emit(ProtocolEvent::Connect);
                }
                connected_once = true;
                reconnect_delay = shared.config.initial_reconnect_delay();

                let outcome = run_connection(&shared, ws_stream, &mut command_rx).await;
                shared.ready.store(false, Ordering::SeqCst);
                shared.fail_pending("connection lost");

                match outcome {
                    Ok(Closed::Shutdown) => {
                        shared.emit(ProtocolEvent::Disconnect);
                        return;
                    }
                    Ok(Closed::Remote) => {
                        warn!("Server closed the connection");
                        shared.emit(ProtocolEvent::NetworkError(
                            "connection closed by server".to_string(),
                        ));
                    }
                    Err(e) => {
                        warn!("Connection error: {}", e);
                        shared.emit(ProtocolEvent::NetworkError(e.to_string()));
                    }
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", shared.url, e);
                shared.emit(ProtocolEvent::NetworkError(e.to_string()));
                if let Some(tx) = first_tx.take() {
                    let _ = tx.send(Err(e));
                }
            }
        }

        if !shared.config.auto_reconnect {
            shared.emit(ProtocolEvent::Disconnect);
            return;
        }

        // Wait before reconnecting, but check for shutdown command
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                // Exponential backoff
                reconnect_delay = (reconnect_delay * 2).min(shared.config.max_reconnect_delay());
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(Command::Shutdown) | None => {
                        shared.emit(ProtocolEvent::Disconnect);
                        return;
                    }
                    Some(Command::Send(_)) => {
                        // Sent while the socket was down; its sender already failed
                    }
                }
            }
        }
    }
}

async fn connect_with_timeout(shared: &Shared) -> SdkResult<WsStream> {
    let timeout = shared.config.connect_timeout();
    match tokio::time::timeout(timeout, connect_async(&shared.url)).await {
        Ok(Ok((ws_stream, _response))) => Ok(ws_stream),
        Ok(Err(e)) => Err(SdkError::Network(e.to_string())),
        Err(_) => Err(SdkError::Network(format!(
            "timed out after {}ms connecting to {}",
            timeout.as_millis(),
            shared.url
        ))),
    }
}

/// Pump frames until the connection ends
async fn run_connection(
    shared: &Shared,
    ws_stream: WsStream,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> SdkResult<Closed> {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(Command::Send(frame)) => {
                        write
                            .send(Message::Text(frame))
                            .await
                            .map_err(|e| SdkError::Network(e.to_string()))?;
                    }
                    Some(Command::Shutdown) | None => {
                        write.close().await.ok();
                        return Ok(Closed::Shutdown);
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.route_frame(&text),
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await.ok();
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(Closed::Remote),
                    Some(Err(e)) => return Err(SdkError::Network(e.to_string())),
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protocol() -> WebSocketProtocol {
        WebSocketProtocol::new("ws://localhost:7512", WebSocketConfig::default())
    }

    #[tokio::test]
    async fn test_response_frame_resolves_pending_request() {
        let protocol = protocol();
        let (tx, rx) = oneshot::channel();
        protocol.shared.pending.lock().insert("r1".to_string(), tx);

        let frame = json!({ "requestId": "r1", "status": 200, "result": { "ok": true } });
        protocol.shared.route_frame(&frame.to_string());

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.result, json!({ "ok": true }));
        assert!(protocol.shared.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_notification_frames_are_broadcast() {
        let protocol = protocol();
        let mut rx = protocol.subscribe();

        let frame = json!({
            "type": "document",
            "room": "channel-1",
            "requestId": "someone-else",
            "index": "nyc",
            "collection": "taxis",
            "event": "delete",
            "result": { "_id": "t1" }
        });
        protocol.shared.route_frame(&frame.to_string());
        protocol
            .shared
            .route_frame(&json!({ "type": "TokenExpired", "room": "x" }).to_string());

        match rx.recv().await.unwrap() {
            ProtocolEvent::Notification(n) => assert_eq!(n.room.as_deref(), Some("channel-1")),
            other => panic!("Expected notification, got {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap(), ProtocolEvent::TokenExpired);
    }

    #[tokio::test]
    async fn test_send_while_offline_is_discarded() {
        let protocol = protocol();
        let mut rx = protocol.subscribe();

        let request = Request::new("server", "now").with("requestId", "r1");
        let err = protocol.send(&request).await.unwrap_err();

        assert!(matches!(err, SdkError::NotConnected(_)));
        assert_eq!(rx.recv().await.unwrap(), ProtocolEvent::Discarded(request));
    }

    #[test]
    fn test_fail_pending_drains_everything() {
        let protocol = protocol();
        let (tx, mut rx) = oneshot::channel();
        protocol.shared.pending.lock().insert("r1".to_string(), tx);

        protocol.shared.fail_pending("gone");

        assert!(matches!(rx.try_recv(), Ok(Err(SdkError::Network(_)))));
    }
}
