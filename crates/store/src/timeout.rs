//! Per-call timeouts for any object store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::store::{ObjectStore, WatchStream};
use crate::types::{Resource, Selector};

/// A wrapper that bounds every store call with a timeout.
///
/// Timeouts apply to single calls, never to a whole reconcile pass.
pub struct TimeoutStore<S: ObjectStore> {
    inner: S,
    timeout: Duration,
}

impl<S: ObjectStore> TimeoutStore<S> {
    /// Wrap a store.
    pub const fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                tracing::debug!(operation, timeout_ms = self.timeout_ms(), "Store call timed out");
                Err(StoreError::timeout(operation, self.timeout_ms()))
            })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TimeoutStore<S> {
    async fn get(&self, name: &str) -> Result<Option<Resource>> {
        self.bounded("get", self.inner.get(name)).await
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Resource>> {
        self.bounded("list", self.inner.list(selector)).await
    }

    async fn watch(&self, selector: &Selector) -> Result<WatchStream> {
        self.bounded("watch", self.inner.watch(selector)).await
    }

    async fn create(&self, object: Resource) -> Result<Resource> {
        self.bounded("create", self.inner.create(object)).await
    }

    async fn update(&self, object: Resource) -> Result<Resource> {
        self.bounded("update", self.inner.update(object)).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.bounded("delete", self.inner.delete(name)).await
    }
}
