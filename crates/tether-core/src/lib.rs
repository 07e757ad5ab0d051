//! Tether Core Library
//!
//! Client-side engine for realtime document backends. It sits between
//! application code and a transport and takes care of everything with state:
//!
//! - **Query dispatch**: requests are enriched, sent with an optional timeout,
//!   or parked in an offline queue and replayed in order once connected
//! - **Connection state machine**: queuing while offline, replay on
//!   reconnection, token re-authentication and expiry handling
//! - **Realtime observer**: documents that update themselves from
//!   notifications, backed by one subscription per collection
//! - **Search cursors**: one `next()` over scroll, `search_after` and
//!   `from`/`size` pagination
//!
//! # Quick Start
//!
//! ```text
//! let config = SdkConfig::load()?;
//! let url = config.url.clone().unwrap_or_else(|| "ws://localhost:7512".into());
//! let protocol = Arc::new(WebSocketProtocol::new(&url, config.websocket.clone()));
//! let sdk = Sdk::new(protocol, config);
//! sdk.connect().await?;
//!
//! let taxi = Observer::new(sdk.clone()).get("nyc", "taxis", "t1").await?;
//! // taxi.get("status") follows the backend from now on
//! ```
//!
//! # Modules
//!
//! - `client`: the [`Sdk`] handle, dispatcher and connection handling
//! - `controllers`: request builders for `auth`, `document` and `realtime`
//! - `protocol`: the transport trait, WebSocket and in-memory transports
//! - `queue`: the offline queue
//! - `observer`: live documents
//! - `search_result`: paginated search results
//! - `config`: SDK configuration

pub mod client;
pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod message;
pub mod observer;
pub mod protocol;
pub mod queue;
pub mod search_result;

pub use client::{
    Authenticator, ConnectionStatus, QueryOptions, QueueFilter, QueueLoader, Sdk,
};
pub use config::{OfflineMode, SdkConfig, Timeout, WebSocketConfig};
pub use controllers::{
    Controller, MGetResult, NamedController, NotificationHandler, SearchOptions,
    SubscribeOptions, TokenValidity,
};
pub use error::{SdkError, SdkResult};
pub use events::SdkEvent;
pub use message::{Document, Hit, JsonObject, Notification, NotificationEvent, Request, Response};
pub use observer::{ObservedHits, ObservedMGet, Observer, RealtimeDocument};
pub use protocol::{MockProtocol, Protocol, ProtocolEvent, WebSocketProtocol};
pub use search_result::{DocumentHits, DocumentSearchResult, HitMapper, SearchActions, SearchResult};
