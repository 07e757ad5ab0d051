//! Transport protocols
//!
//! The SDK never touches the wire itself. A [`Protocol`] sends requests,
//! answers with responses and reports its lifecycle through
//! [`ProtocolEvent`]s on a broadcast channel.
//!
//! - [`WebSocketProtocol`]: JSON frames over a persistent WebSocket
//! - [`MockProtocol`]: in-memory transport for tests

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::SdkResult;
use crate::message::{Notification, Request, Response};

mod mock;
mod websocket;

pub use mock::MockProtocol;
pub use websocket::WebSocketProtocol;

/// Capacity of protocol event channels
pub(crate) const PROTOCOL_EVENT_CAPACITY: usize = 1024;

/// Lifecycle and push events reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// First successful connection
    Connect,
    /// The connection was closed on purpose
    Disconnect,
    /// The connection came back after a loss
    Reconnect,
    /// The connection was lost or could not be established
    NetworkError(String),
    /// A request failed at the transport level
    QueryError { error: String, request: Request },
    /// The backend reported that the authentication token expired
    TokenExpired,
    /// A request was dropped because the transport is not connected
    Discarded(Request),
    /// A realtime notification
    Notification(Notification),
}

/// A transport able to carry requests to the backend
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Short name, for logs
    fn name(&self) -> &str;

    /// Start connecting. Resolves once the first connection attempt settles.
    async fn connect(&self) -> SdkResult<()>;

    /// Close the connection and stop reconnecting
    async fn close(&self);

    /// Whether requests can be sent right now
    fn is_ready(&self) -> bool;

    /// Send a request and wait for its response
    ///
    /// Responses carrying an error payload are returned as `Err`.
    async fn send(&self, request: &Request) -> SdkResult<Response>;

    /// Subscribe to transport events
    fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent>;
}
