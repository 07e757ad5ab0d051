//! Connection state machine
//!
//! Turns transport events into SDK state: queuing while offline, replaying
//! once back, re-authenticating after a reconnection and handling token
//! expiry. The event loop holds a weak reference so dropping every [`Sdk`]
//! handle stops it.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{ConnectionStatus, Sdk, SdkInner};
use crate::error::{SdkError, SdkResult};
use crate::events::SdkEvent;
use crate::message::NotificationType;
use crate::protocol::ProtocolEvent;

/// Releases the reconnection slot when the handler returns
struct ReconnectGuard<'a>(&'a Sdk);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.inner.state.end_reconnect();
    }
}

impl Sdk {
    /// Connect the transport
    ///
    /// Does nothing if the transport is already ready.
    pub async fn connect(&self) -> SdkResult<()> {
        if self.inner.protocol.is_ready() {
            return Ok(());
        }

        self.listen();

        if self.inner.config.auto_queue {
            self.start_queuing();
        }

        self.set_status(ConnectionStatus::Connecting);
        info!("Connecting through {}", self.inner.protocol.name());
        if let Err(e) = self.inner.protocol.connect().await {
            error!("Connection failed: {}", e);
            self.set_status(ConnectionStatus::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    /// Close the connection and log out locally
    pub async fn disconnect(&self) {
        self.inner.state.set_logged_in(false);
        self.inner.protocol.close().await;
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Start the transport event loop, once per instance
    fn listen(&self) {
        if self.inner.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        // Subscribe before connecting so the first Connect is not missed
        let events = self.inner.protocol.subscribe();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(event_loop(inner, events));
    }

    fn handle_protocol_event(&self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::Connect => {
                info!("Connected");
                if self.inner.config.auto_queue {
                    self.stop_queuing();
                }
                if self.inner.config.auto_replay {
                    self.spawn_replay();
                }
                self.set_status(ConnectionStatus::Connected);
                self.emit(SdkEvent::Connected);
            }
            ProtocolEvent::NetworkError(reason) => {
                warn!("Network error: {}", reason);
                if self.inner.config.auto_queue {
                    self.start_queuing();
                }
                self.set_status(ConnectionStatus::Reconnecting);
                self.emit(SdkEvent::NetworkError(reason));
            }
            ProtocolEvent::Disconnect => {
                info!("Disconnected");
                self.set_status(ConnectionStatus::Disconnected);
                self.emit(SdkEvent::Disconnected);
            }
            ProtocolEvent::Reconnect => {
                let sdk = self.clone();
                tokio::spawn(async move { sdk.on_reconnect().await });
            }
            ProtocolEvent::TokenExpired => {
                let sdk = self.clone();
                tokio::spawn(async move { sdk.token_expired().await });
            }
            ProtocolEvent::QueryError { error, request } => {
                self.emit(SdkEvent::QueryError { error, request });
            }
            ProtocolEvent::Discarded(request) => {
                self.emit(SdkEvent::Discarded(request));
            }
            ProtocolEvent::Notification(notification) => {
                if notification.kind == NotificationType::TokenExpired {
                    let sdk = self.clone();
                    tokio::spawn(async move { sdk.token_expired().await });
                    return;
                }
                let handled = self
                    .inner
                    .rooms
                    .dispatch(&notification, &self.inner.instance_id);
                if handled == 0 {
                    debug!("No subscription for notification on {:?}", notification.room);
                }
            }
        }
    }

    fn spawn_replay(&self) {
        let sdk = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sdk.play_queue().await {
                error!("Offline queue replay failed: {}", e);
            }
        });
    }

    /// Handle a transport reconnection
    async fn on_reconnect(&self) {
        if !self.inner.state.begin_reconnect() {
            debug!("Reconnection already being handled");
            return;
        }
        let _guard = ReconnectGuard(self);
        info!("Reconnected");

        if self.inner.config.auto_queue {
            self.stop_queuing();
        }

        if self.is_logged_in() {
            self.set_status(ConnectionStatus::Authenticating);
            if !self.try_reauthenticate().await {
                warn!("Re-authentication failed, disconnecting");
                self.disconnect().await;
                return;
            }
        }

        if self.inner.config.auto_resubscribe {
            let renewed = self.realtime().renew_subscriptions().await;
            if renewed > 0 {
                debug!("Renewed {} subscriptions", renewed);
            }
        }

        if self.inner.config.auto_replay {
            self.spawn_replay();
        }

        self.set_status(ConnectionStatus::Connected);
        self.emit(SdkEvent::Reconnected);
    }

    /// Make sure the SDK holds a valid token, calling the authenticator if
    /// needed. Failures are reported through `reconnectionError`.
    pub async fn try_reauthenticate(&self) -> bool {
        match self.reauthenticate().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Re-authentication failed: {}", e);
                self.emit(SdkEvent::ReconnectionError(e.to_string()));
                false
            }
        }
    }

    async fn reauthenticate(&self) -> SdkResult<()> {
        let jwt = self.jwt();
        let validity = self.auth().check_token(jwt.as_deref()).await?;
        if validity.valid {
            return Ok(());
        }

        if self.inner.authenticator.read().is_none() {
            return Err(SdkError::ReauthenticationFailure(
                "the authentication token is invalid and no authenticator is set".to_string(),
            ));
        }
        self.authenticate().await
    }

    /// Run the authenticator, then check the token it produced
    pub async fn authenticate(&self) -> SdkResult<()> {
        let Some(authenticator) = self.inner.authenticator.read().clone() else {
            return Err(SdkError::ReauthenticationFailure(
                "no authenticator is set".to_string(),
            ));
        };

        authenticator(self.clone()).await?;

        let jwt = self.jwt();
        let validity = self.auth().check_token(jwt.as_deref()).await?;
        self.inner.state.set_logged_in(validity.valid);
        if !validity.valid {
            return Err(SdkError::ReauthenticationFailure(format!(
                "the authenticator did not produce a valid token ({})",
                validity.state.unwrap_or_else(|| "no reason given".to_string())
            )));
        }
        debug!("Authenticated");
        Ok(())
    }

    /// Handle an expired authentication token
    async fn token_expired(&self) {
        if self.inner.state.is_reconnect_in_progress() {
            debug!("Ignoring token expiry during reconnection");
            return;
        }

        if self.is_logged_in() && self.try_reauthenticate().await {
            info!("Re-authenticated after token expiry");
            self.emit(SdkEvent::ReAuthenticated);
            return;
        }

        if self
            .inner
            .state
            .mark_token_expired(self.inner.config.token_expired_interval())
        {
            warn!("Authentication token expired");
            self.set_jwt(None);
            self.inner.state.set_logged_in(false);
            self.emit(SdkEvent::TokenExpired);
        }
    }
}

async fn event_loop(inner: Weak<SdkInner>, mut events: broadcast::Receiver<ProtocolEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event loop lagged, skipped {} transport events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        Sdk { inner }.handle_protocol_event(event);
    }
    debug!("Transport event loop stopped");
}
