//! Query dispatcher
//!
//! Every request is enriched (request id, volatile data, token, option
//! fields), then either sent right away, raced against its timeout, or parked
//! in the offline queue until the next replay.

use std::sync::atomic::Ordering;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{QueryOptions, Sdk};
use crate::config::Timeout;
use crate::error::{SdkError, SdkResult};
use crate::events::SdkEvent;
use crate::message::{keys, JsonObject, Request, Response};
use crate::queue::QueueEntry;

impl Sdk {
    /// Send a raw request
    ///
    /// The request must be a JSON object carrying at least `controller` and
    /// `action`.
    pub async fn query(&self, request: Value, options: QueryOptions) -> SdkResult<Response> {
        let request = Request::from_value(request)?;
        self.send_request(request, options).await
    }

    /// Send a request through a registered controller
    ///
    /// The controller decides how the request is shaped before dispatch.
    pub async fn controller_query(
        &self,
        controller: &str,
        action: &str,
        request: Request,
        options: QueryOptions,
    ) -> SdkResult<Response> {
        let Some(handler) = self.controller(controller) else {
            return Err(SdkError::UnknownController(controller.to_string()));
        };
        handler.query(self, action, request, options).await
    }

    /// Dispatch a typed request
    pub async fn send_request(
        &self,
        mut request: Request,
        options: QueryOptions,
    ) -> SdkResult<Response> {
        self.enrich(&mut request, &options)?;

        let mut queuable = options.queuable != Some(false);
        if let Some(filter) = self.inner.queue_filter.read().clone() {
            queuable = queuable && filter(&request);
        }
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.config.request_timeout());

        if self.inner.state.is_queuing() {
            if queuable {
                return self.enqueue(request, timeout).await;
            }
            return Err(self.discard(request, "not connected, and the request cannot be queued"));
        }

        if !self.inner.protocol.is_ready() {
            return Err(self.discard(request, "not connected"));
        }

        self.send_with_timeout(request, timeout).await
    }

    /// Fill in the fields every outbound request carries
    fn enrich(&self, request: &mut Request, options: &QueryOptions) -> SdkResult<()> {
        let mut volatile = match request.remove(keys::VOLATILE) {
            None | Some(Value::Null) => JsonObject::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(SdkError::InvalidArgument(format!(
                    "Invalid volatile argument received: {}",
                    other
                )))
            }
        };
        for (key, value) in &self.inner.config.volatile {
            volatile
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        volatile
            .entry(keys::SDK_INSTANCE_ID)
            .or_insert_with(|| Value::from(self.inner.instance_id.clone()));
        volatile
            .entry(keys::SDK_NAME)
            .or_insert_with(|| Value::from(self.inner.config.sdk_name.clone()));
        request.set(keys::VOLATILE, Value::Object(volatile));

        if !request.contains(keys::REQUEST_ID) {
            request.set(keys::REQUEST_ID, Uuid::new_v4().to_string());
        }

        if !request.contains(keys::REFRESH) {
            if let Some(refresh) = &options.refresh {
                request.set(keys::REFRESH, refresh.as_str());
            }
        }
        if request
            .get(keys::REFRESH)
            .is_some_and(|v| !v.is_null() && v != &Value::Bool(false))
        {
            request.set(keys::REFRESH, "wait_for");
        }

        if !request.contains(keys::RETRY_ON_CONFLICT) {
            if let Some(retries) = options.retry_on_conflict {
                request.set(keys::RETRY_ON_CONFLICT, retries);
            }
        }

        let is_check_token =
            request.controller() == Some("auth") && request.action() == Some("checkToken");
        if !is_check_token && !request.contains(keys::JWT) {
            if let Some(jwt) = self.jwt() {
                request.set(keys::JWT, jwt);
            }
        }

        Ok(())
    }

    /// Reject a request issued while offline
    fn discard(&self, request: Request, reason: &str) -> SdkError {
        debug!("Discarding {} ({})", request.route(), reason);
        self.emit(SdkEvent::Discarded(request.clone()));
        SdkError::Discarded {
            reason: reason.to_string(),
            request: Box::new(request),
        }
    }

    /// Park a request until the next replay
    async fn enqueue(&self, request: Request, timeout: Timeout) -> SdkResult<Response> {
        let (tx, rx) = oneshot::channel();
        let queued = request.clone();

        let evicted = {
            let mut queue = self.inner.queue.lock();
            let mut evicted = queue.evict(Instant::now());
            queue.push(QueueEntry::new(request.clone(), timeout, tx));
            evicted.extend(queue.evict(Instant::now()));
            evicted
        };
        self.settle_evicted(evicted);

        debug!("Queued {} while offline", queued.route());
        self.emit(SdkEvent::OfflineQueuePush(queued));

        rx.await.unwrap_or_else(|_| {
            Err(SdkError::Discarded {
                reason: "the offline queue was dropped".to_string(),
                request: Box::new(request),
            })
        })
    }

    fn settle_evicted(&self, evicted: Vec<(QueueEntry, SdkError)>) {
        for (entry, err) in evicted {
            warn!("Dropping queued {}: {}", entry.request.route(), err);
            self.emit(SdkEvent::OfflineQueuePop(entry.request.clone()));
            entry.settle(Err(err));
        }
    }

    /// Send through the transport, racing the timeout
    ///
    /// A request that times out is not retracted: the transport keeps
    /// handling it in the background and its eventual response is dropped.
    pub(crate) async fn send_with_timeout(
        &self,
        request: Request,
        timeout: Timeout,
    ) -> SdkResult<Response> {
        let protocol = self.inner.protocol.clone();

        let result = match timeout.duration() {
            None => protocol.send(&request).await,
            Some(limit) => {
                let in_flight = request.clone();
                let task = tokio::spawn(async move { protocol.send(&in_flight).await });
                match tokio::time::timeout(limit, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(SdkError::Protocol(format!("send task failed: {}", e))),
                    Err(_) => {
                        warn!("{} timed out after {}ms", request.route(), limit.as_millis());
                        return Err(SdkError::RequestTimeout {
                            timeout: limit,
                            request: Box::new(request),
                        });
                    }
                }
            }
        };

        if let Err(e) = &result {
            debug!("{} failed: {}", request.route(), e);
            self.emit(SdkEvent::QueryError {
                error: e.to_string(),
                request,
            });
        }
        result
    }

    /// Start queuing requests instead of sending them
    pub fn start_queuing(&self) {
        if !self.inner.state.is_queuing() {
            debug!("Offline queuing started");
        }
        self.inner.state.set_queuing(true);
    }

    /// Stop queuing; new requests are sent right away again
    pub fn stop_queuing(&self) {
        if self.inner.state.is_queuing() {
            debug!("Offline queuing stopped");
        }
        self.inner.state.set_queuing(false);
    }

    pub fn is_queuing(&self) -> bool {
        self.inner.state.is_queuing()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Reject and drop every queued request
    pub fn flush_queue(&self) -> usize {
        let entries = self.inner.queue.lock().drain();
        let count = entries.len();
        for entry in entries {
            let request = entry.request.clone();
            entry.settle(Err(SdkError::Discarded {
                reason: "the offline queue was flushed".to_string(),
                request: Box::new(request),
            }));
        }
        if count > 0 {
            info!("Flushed {} queued requests", count);
        }
        count
    }

    /// Replay the offline queue
    ///
    /// Does nothing unless the transport is ready. Stale entries are evicted
    /// first, then the queue loader (if any) prepends persisted requests, then
    /// entries are sent one at a time in FIFO order, `replay_interval` apart.
    /// Replay stops early if the SDK starts queuing again.
    pub async fn play_queue(&self) -> SdkResult<()> {
        if !self.inner.protocol.is_ready() {
            debug!("Not replaying the offline queue: transport not ready");
            return Ok(());
        }
        if self.inner.replaying.swap(true, Ordering::SeqCst) {
            debug!("Offline queue replay already running");
            return Ok(());
        }

        let result = self.replay().await;
        self.inner.replaying.store(false, Ordering::SeqCst);
        result
    }

    async fn replay(&self) -> SdkResult<()> {
        let evicted = self.inner.queue.lock().evict(Instant::now());
        self.settle_evicted(evicted);

        let loader = self.inner.queue_loader.read().clone();
        if let Some(loader) = loader {
            let loaded = loader().await?;
            let count = self
                .inner
                .queue
                .lock()
                .prepend_loaded(loaded, self.inner.config.request_timeout())?;
            debug!("Queue loader restored {} requests", count);
        }

        let total = self.queue_len();
        if total > 0 {
            info!("Replaying {} queued requests", total);
        }

        let interval = self.inner.config.replay_interval();
        let mut replayed = 0;
        loop {
            if self.inner.state.is_queuing() || !self.inner.protocol.is_ready() {
                warn!("Replay interrupted, {} requests still queued", self.queue_len());
                break;
            }

            let Some(entry) = self.inner.queue.lock().pop_front() else {
                break;
            };
            self.emit(SdkEvent::OfflineQueuePop(entry.request.clone()));

            let result = self
                .send_with_timeout(entry.request.clone(), entry.timeout)
                .await;
            entry.settle(result);
            replayed += 1;

            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        if replayed > 0 {
            debug!("Replayed {} requests", replayed);
        }
        Ok(())
    }
}
