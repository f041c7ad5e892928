//! Rate-limited work queue of object names.
//!
//! - A name waiting in the queue is stored once, however often it is added.
//! - A name is handed to at most one worker at a time. Adding it while it is
//!   being processed queues it again once the worker calls [`WorkQueue::done`].
//! - Failed names are re-added with per-name exponential backoff and no
//!   retry cap.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::trace;

use crate::config::BackoffConfig;

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<String>,
    /// Names that need processing: queued, or re-added while processing.
    dirty: HashSet<String>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    backoff: BackoffConfig,
}

/// Shared handle to a work queue. Clones refer to the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Create an empty queue retrying failures with `backoff`.
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    /// Mark `key` as needing processing.
    pub async fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.inner.state.lock().await;
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            trace!(key = %key, "Key busy, deferring until done");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        let queue = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.add(key).await;
        });
    }

    /// Re-add `key` after its backoff delay and count the failure.
    pub async fn add_rate_limited(&self, key: impl Into<String>) {
        let key = key.into();
        let delay = {
            let mut state = self.inner.state.lock().await;
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.inner.backoff.delay_for(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        trace!(key = %key, delay_ms = delay.as_millis(), "Requeueing with backoff");
        self.add_after(key, delay);
    }

    /// Reset the backoff of `key`.
    pub async fn forget(&self, key: &str) {
        self.inner.state.lock().await.failures.remove(key);
    }

    /// Failures counted for `key` since it was last forgotten.
    pub async fn num_requeues(&self, key: &str) -> u32 {
        self.inner
            .state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Wait for the next key and mark it as processing.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.queue.is_empty() {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Finish processing `key`. Queues it again if it was added meanwhile.
    pub async fn done(&self, key: &str) {
        let mut state = self.inner.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys waiting to be handed out.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop handing out keys and wake every waiting worker.
    pub async fn shut_down(&self) {
        self.inner.state.lock().await.shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub async fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().await.shutting_down
    }
}
