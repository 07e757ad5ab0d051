//! SDK error handling
//!
//! Every failure a caller can observe through a returned `Result` is one of
//! these variants. Connection-level failures are additionally surfaced as
//! [`SdkEvent`](crate::events::SdkEvent)s.

use std::time::Duration;

use thiserror::Error;

use crate::message::Request;

/// Errors produced by the SDK
#[derive(Error, Debug, Clone)]
pub enum SdkError {
    /// Malformed request or options, rejected before dispatch
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The per-request timeout elapsed before the transport answered
    #[error("Request timed out after {}ms", timeout.as_millis())]
    RequestTimeout {
        timeout: Duration,
        request: Box<Request>,
    },

    /// Evicted from the offline queue because the queue grew past its maximum size
    #[error("Query aborted: too many queued requests (see the queue_max_size option)")]
    QueueOverflow { request: Box<Request> },

    /// Evicted from the offline queue because it waited longer than the queue TTL
    #[error("Query aborted: queued time exceeded the queue_ttl option value")]
    QueueExpired { request: Box<Request> },

    /// A non-queuable request was issued while offline, or the queue was flushed
    #[error("Unable to execute request: {reason}")]
    Discarded {
        reason: String,
        request: Box<Request>,
    },

    /// The transport is not connected
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Re-authentication after a reconnection failed
    #[error("Could not re-authenticate: {0}")]
    ReauthenticationFailure(String),

    /// A search cursor has no pagination strategy to fetch its next page
    #[error("Unable to retrieve next results from search: missing scroll, sort or from/size parameters")]
    PaginationUnsupported,

    /// A request loaded by the offline queue loader is missing required fields
    #[error("Invalid offline queue request. One or more missing properties: requestId, action, controller")]
    InvalidQueueEntry,

    /// A controller with this name is already registered
    #[error("A controller named '{0}' is already registered")]
    DuplicateController(String),

    /// No controller with this name is registered
    #[error("Unknown controller '{0}'")]
    UnknownController(String),

    /// The backend answered with an error
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        id: Option<String>,
    },

    /// Network-level failure reported by the transport
    #[error("Network error: {0}")]
    Network(String),

    /// The transport received something it could not make sense of
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for SdkError {
    fn from(error: serde_json::Error) -> Self {
        SdkError::Json(error.to_string())
    }
}

impl SdkError {
    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SdkError::RequestTimeout { .. }
                | SdkError::QueueOverflow { .. }
                | SdkError::QueueExpired { .. }
                | SdkError::Discarded { .. }
                | SdkError::NotConnected(_)
                | SdkError::Network(_)
        )
    }

    /// The request this error is about, when one is attached
    pub fn request(&self) -> Option<&Request> {
        match self {
            SdkError::RequestTimeout { request, .. }
            | SdkError::QueueOverflow { request }
            | SdkError::QueueExpired { request }
            | SdkError::Discarded { request, .. } => Some(request),
            _ => None,
        }
    }
}

/// Result type for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;
