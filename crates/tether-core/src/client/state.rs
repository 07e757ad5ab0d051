//! Connection state
//!
//! Flags the connection state machine maintains and the query dispatcher
//! reads to decide between sending and queuing.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected, not trying
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection lost, the transport is trying to get it back
    Reconnecting,
    /// Connection is back, validating the authentication token
    Authenticating,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::Authenticating => write!(f, "authenticating"),
        }
    }
}

/// Process-wide connection flags of one SDK instance
#[derive(Debug, Default)]
pub struct ConnectionState {
    queuing: AtomicBool,
    reconnect_in_progress: AtomicBool,
    logged_in: AtomicBool,
    last_token_expired_at: Mutex<Option<Instant>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_queuing(&self) -> bool {
        self.queuing.load(Ordering::SeqCst)
    }

    pub fn set_queuing(&self, queuing: bool) {
        self.queuing.store(queuing, Ordering::SeqCst);
    }

    pub fn is_reconnect_in_progress(&self) -> bool {
        self.reconnect_in_progress.load(Ordering::SeqCst)
    }

    /// Claim the reconnection slot. Returns false if it was already taken.
    pub fn begin_reconnect(&self) -> bool {
        self.reconnect_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_reconnect(&self) {
        self.reconnect_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }

    /// Record a token expiry unless one was recorded less than `interval` ago
    pub fn mark_token_expired(&self, interval: std::time::Duration) -> bool {
        let now = Instant::now();
        let mut last = self.last_token_expired_at.lock();
        match *last {
            Some(at) if now.duration_since(at) <= interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
