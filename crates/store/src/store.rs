//! Object store trait and watch streams.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::{Resource, Selector, WatchEvent};

/// Trait for object store backends.
///
/// The same interface is used for the master store, for every seed store
/// and for the store that holds target membership.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get an object by name. Absence is `Ok(None)`, not an error.
    async fn get(&self, name: &str) -> Result<Option<Resource>>;

    /// List objects matching a selector, ordered by name.
    async fn list(&self, selector: &Selector) -> Result<Vec<Resource>>;

    /// Open a stream of changes matching a selector.
    async fn watch(&self, selector: &Selector) -> Result<WatchStream>;

    /// Create an object. The store assigns uid and resource version.
    async fn create(&self, object: Resource) -> Result<Resource>;

    /// Update an object.
    ///
    /// Rejected with a conflict when `object.meta.resource_version` does not
    /// match the stored version.
    async fn update(&self, object: Resource) -> Result<Resource>;

    /// Delete an object by name.
    ///
    /// Returns `StoreError::NotFound` for an absent object. An object that
    /// still carries finalizers is only marked for deletion.
    async fn delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn get(&self, name: &str) -> Result<Option<Resource>> {
        (**self).get(name).await
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Resource>> {
        (**self).list(selector).await
    }

    async fn watch(&self, selector: &Selector) -> Result<WatchStream> {
        (**self).watch(selector).await
    }

    async fn create(&self, object: Resource) -> Result<Resource> {
        (**self).create(object).await
    }

    async fn update(&self, object: Resource) -> Result<Resource> {
        (**self).update(object).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        (**self).delete(name).await
    }
}

/// Outcome of waiting on a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchRecv {
    /// A matching change.
    Event(WatchEvent),
    /// The consumer fell behind and `n` events were dropped. The caller must
    /// resynchronise from a fresh list.
    Lagged(u64),
    /// The store stopped producing events.
    Closed,
}

/// Subscription handle for receiving store changes.
pub struct WatchStream {
    receiver: broadcast::Receiver<WatchEvent>,
    selector: Selector,
}

impl WatchStream {
    /// Wrap a broadcast receiver, filtering by selector.
    pub const fn new(receiver: broadcast::Receiver<WatchEvent>, selector: Selector) -> Self {
        Self { receiver, selector }
    }

    /// Receive the next matching change.
    pub async fn recv(&mut self) -> WatchRecv {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.selector.matches(event.object()) => {
                    return WatchRecv::Event(event);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => return WatchRecv::Lagged(n),
                Err(broadcast::error::RecvError::Closed) => return WatchRecv::Closed,
            }
        }
    }
}
