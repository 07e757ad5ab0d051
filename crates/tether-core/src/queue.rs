//! Offline request queue
//!
//! Requests issued while the SDK is queuing wait here until they are
//! replayed, evicted or flushed. Entries are kept in FIFO order and eviction
//! only ever removes a contiguous prefix of the oldest entries.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::Timeout;
use crate::error::{SdkError, SdkResult};
use crate::message::{Request, Response};

/// One queued request
#[derive(Debug)]
pub struct QueueEntry {
    pub request: Request,
    /// Timeout to apply once the request is replayed
    pub timeout: Timeout,
    pub enqueued_at: Instant,
    /// Continuation of the caller waiting on this request. Entries restored
    /// by a queue loader have nobody waiting on them.
    resolver: Option<oneshot::Sender<SdkResult<Response>>>,
}

impl QueueEntry {
    pub fn new(
        request: Request,
        timeout: Timeout,
        resolver: oneshot::Sender<SdkResult<Response>>,
    ) -> Self {
        Self {
            request,
            timeout,
            enqueued_at: Instant::now(),
            resolver: Some(resolver),
        }
    }

    /// An entry restored from persistence
    pub fn detached(request: Request, timeout: Timeout) -> Self {
        Self {
            request,
            timeout,
            enqueued_at: Instant::now(),
            resolver: None,
        }
    }

    /// Deliver the outcome to whoever is waiting
    pub fn settle(mut self, result: SdkResult<Response>) {
        if let Some(resolver) = self.resolver.take() {
            // The caller may have given up on the request
            let _ = resolver.send(result);
        }
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

/// FIFO queue of requests waiting for the connection to come back
#[derive(Debug)]
pub struct OfflineQueue {
    entries: VecDeque<QueueEntry>,
    ttl: Option<Duration>,
    max_size: Option<usize>,
}

impl OfflineQueue {
    pub fn new(ttl: Option<Duration>, max_size: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove the entries that must not be replayed anymore
    ///
    /// Everything up to the last entry older than the TTL goes first, then the
    /// oldest entries beyond the maximum size. Evicted entries are returned
    /// paired with their error, oldest first; the caller settles them.
    pub fn evict(&mut self, now: Instant) -> Vec<(QueueEntry, SdkError)> {
        let mut evicted = Vec::new();

        if let Some(ttl) = self.ttl {
            let expired = self.entries.iter().rposition(|entry| entry.age(now) > ttl);
            if let Some(last) = expired {
                for entry in self.entries.drain(..=last) {
                    let err = SdkError::QueueExpired {
                        request: Box::new(entry.request.clone()),
                    };
                    evicted.push((entry, err));
                }
            }
        }

        if let Some(max) = self.max_size {
            if self.entries.len() > max {
                let excess = self.entries.len() - max;
                for entry in self.entries.drain(..excess) {
                    let err = SdkError::QueueOverflow {
                        request: Box::new(entry.request.clone()),
                    };
                    evicted.push((entry, err));
                }
            }
        }

        evicted
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Put loader-provided requests in front of the live queue
    ///
    /// Every loaded request must carry `requestId`, `controller` and `action`,
    /// otherwise nothing is inserted. Duplicates by `requestId` are removed
    /// within the loaded batch only; the first occurrence wins.
    pub fn prepend_loaded(&mut self, loaded: Vec<Request>, timeout: Timeout) -> SdkResult<usize> {
        if loaded
            .iter()
            .any(|r| r.request_id().is_none() || r.controller().is_none() || r.action().is_none())
        {
            return Err(SdkError::InvalidQueueEntry);
        }

        let mut seen = HashSet::new();
        let unique: Vec<Request> = loaded
            .into_iter()
            .filter(|r| seen.insert(r.request_id().unwrap_or_default().to_string()))
            .collect();

        let count = unique.len();
        for request in unique.into_iter().rev() {
            self.entries.push_front(QueueEntry::detached(request, timeout));
        }
        Ok(count)
    }

    /// Empty the queue, returning every entry
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.entries.iter().map(|entry| &entry.request)
    }
}
