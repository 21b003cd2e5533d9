//! In-memory blocking list queue
//!
//! Same semantics as a Redis list drained with `BRPOP`: `push` adds to the
//! head, `pop` takes from the tail, so items come out in push order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use contracts::{BlockingQueue, ContractError, Item};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Default)]
struct Shared {
    lists: Mutex<HashMap<String, VecDeque<Bytes>>>,
    notify: Notify,
    connected: AtomicBool,
    pending_failures: AtomicU32,
    connect_count: AtomicU64,
    pop_count: AtomicU64,
}

impl Shared {
    fn lists(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Bytes>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one injected failure, if any are pending
    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-process queue; clones share the same lists.
#[derive(Clone)]
pub struct MemoryQueue {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Add a payload to the head of `key` and wake blocked pops
    pub fn push(&self, key: &str, payload: impl Into<Bytes>) {
        self.shared
            .lists()
            .entry(key.to_string())
            .or_default()
            .push_front(payload.into());
        self.shared.notify.notify_waiters();
        trace!(queue = %self.name, key, "memory queue push");
    }

    /// Number of items waiting under `key`
    pub fn len(&self, key: &str) -> usize {
        self.shared.lists().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    /// Make the next `count` connect/pop calls fail with a connection error
    pub fn inject_failures(&self, count: u32) {
        self.shared.pending_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Successful and failed connect attempts so far
    pub fn connect_count(&self) -> u64 {
        self.shared.connect_count.load(Ordering::Relaxed)
    }

    /// Pop attempts so far, including empty ones
    pub fn pop_count(&self) -> u64 {
        self.shared.pop_count.load(Ordering::Relaxed)
    }

    fn connection_error(&self, message: &str) -> ContractError {
        ContractError::queue_connection(format!("memory://{}", self.name), message)
    }

    fn try_pop(&self, key: &str) -> Option<Bytes> {
        self.shared.lists().get_mut(key).and_then(VecDeque::pop_back)
    }
}

impl BlockingQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        self.shared.connect_count.fetch_add(1, Ordering::Relaxed);
        if self.shared.take_failure() {
            return Err(self.connection_error("injected connect failure"));
        }
        self.shared.connected.store(true, Ordering::SeqCst);
        debug!(queue = %self.name, "memory queue connected");
        Ok(())
    }

    async fn pop(&mut self, key: &str, timeout: Duration) -> Result<Option<Item>, ContractError> {
        self.shared.pop_count.fetch_add(1, Ordering::Relaxed);

        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(self.connection_error("not connected"));
        }
        if self.shared.take_failure() {
            self.shared.connected.store(false, Ordering::SeqCst);
            return Err(self.connection_error("injected connection drop"));
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking, so a push between the
            // check and the wait is not missed.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop(key) {
                return Ok(Some(Item::new(key, payload)));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}
