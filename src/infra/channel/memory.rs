//! In-memory response transport for tests and in-process callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::{RequestId, Response, ResponseChannel, ResultCode, SchedulerError};
use crate::util::{deadline_after, now_ms};

struct Recorded {
    at_ms: u128,
    response: Response,
}

/// Records every response and lets callers block until one arrives.
pub struct InMemoryChannel {
    recorded: Mutex<Vec<Recorded>>,
    arrived: Condvar,
    alive: AtomicBool,
}

impl InMemoryChannel {
    /// An open, empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
            alive: AtomicBool::new(true),
        }
    }

    /// Every response so far, in delivery order.
    #[must_use]
    pub fn responses(&self) -> Vec<Response> {
        self.recorded
            .lock()
            .iter()
            .map(|r| r.response.clone())
            .collect()
    }

    /// Responses delivered at or after `since_ms`, at most `limit` of them.
    #[must_use]
    pub fn fetch(&self, since_ms: Option<u128>, limit: usize) -> Vec<Response> {
        self.recorded
            .lock()
            .iter()
            .filter(|r| since_ms.is_none_or(|since| r.at_ms >= since))
            .take(limit)
            .map(|r| r.response.clone())
            .collect()
    }

    /// Remove and return every response so far.
    pub fn take(&self) -> Vec<Response> {
        self.recorded
            .lock()
            .drain(..)
            .map(|r| r.response)
            .collect()
    }

    /// Number of responses recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.lock().is_empty()
    }

    /// Refuse further deliveries. The requester registry may then replace it.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Block until the response for `request_id` arrives or `timeout` passes.
    #[must_use]
    pub fn wait_for(&self, request_id: RequestId, timeout: Duration) -> Option<Response> {
        let deadline = deadline_after(Instant::now(), timeout);
        let mut recorded = self.recorded.lock();
        loop {
            if let Some(r) = recorded
                .iter()
                .find(|r| r.response.request_id == request_id)
            {
                return Some(r.response.clone());
            }
            if self.arrived.wait_until(&mut recorded, deadline).timed_out() {
                return recorded
                    .iter()
                    .find(|r| r.response.request_id == request_id)
                    .map(|r| r.response.clone());
            }
        }
    }

    /// Block until at least `count` responses are recorded or `timeout` passes.
    pub fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = deadline_after(Instant::now(), timeout);
        let mut recorded = self.recorded.lock();
        while recorded.len() < count {
            if self.arrived.wait_until(&mut recorded, deadline).timed_out() {
                return recorded.len() >= count;
            }
        }
        true
    }

    /// Async form of [`InMemoryChannel::wait_for`].
    ///
    /// The condvar wait runs on tokio's blocking pool.
    #[cfg(feature = "tokio-runtime")]
    pub async fn wait_for_async(
        self: std::sync::Arc<Self>,
        request_id: RequestId,
        timeout: Duration,
    ) -> Option<Response> {
        let waiter = tokio::task::spawn_blocking(move || self.wait_for(request_id, timeout));
        tokio::time::timeout(timeout.saturating_add(Duration::from_millis(50)), waiter)
            .await
            .ok()?
            .ok()
            .flatten()
    }
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseChannel for InMemoryChannel {
    fn deliver(
        &self,
        request_id: RequestId,
        code: ResultCode,
        payload: Vec<u8>,
    ) -> Result<(), SchedulerError> {
        if !self.is_alive() {
            return Err(SchedulerError::Delivery(format!(
                "channel closed, dropping response to request {request_id}"
            )));
        }
        self.recorded.lock().push(Recorded {
            at_ms: now_ms(),
            response: Response {
                request_id,
                code,
                payload,
            },
        });
        self.arrived.notify_all();
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("responses", &self.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}
