//! In-memory object store.
//!
//! Behaves like a real store for everything the sync engine relies on:
//! store-assigned uids, optimistic concurrency on update, finalizer-gated
//! deletion and a change stream. Write counters and fault injection make it
//! the fake of choice for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use crate::error::{Result, StoreError};
use crate::store::{ObjectStore, WatchStream};
use crate::types::{Resource, Selector, Uid, WatchEvent};

/// Default capacity of the change stream.
const DEFAULT_WATCH_CAPACITY: usize = 1000;

/// Store operations, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Watch,
    Create,
    Update,
    Delete,
}

/// In-memory object store.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Resource>>,
    events: broadcast::Sender<WatchEvent>,
    faults: RwLock<HashMap<Operation, StoreError>>,
    stalls: RwLock<HashSet<Operation>>,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create an empty store whose change stream buffers `capacity` events
    /// per subscriber before it lags.
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
            faults: RwLock::new(HashMap::new()),
            stalls: RwLock::new(HashSet::new()),
            creates: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Make every call of `operation` fail with `error` until cleared.
    pub async fn inject_fault(&self, operation: Operation, error: StoreError) {
        self.faults.write().await.insert(operation, error);
    }

    /// Remove the fault injected for `operation`.
    pub async fn clear_fault(&self, operation: Operation) {
        self.faults.write().await.remove(&operation);
    }

    /// Make every call of `operation` hang until cleared.
    pub async fn stall(&self, operation: Operation) {
        self.stalls.write().await.insert(operation);
    }

    /// Remove every injected fault and stall.
    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
        self.stalls.write().await.clear();
    }

    /// Number of accepted create calls.
    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Number of accepted update calls.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Number of accepted delete calls.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Total number of accepted writes.
    pub fn write_count(&self) -> u64 {
        self.creates()
            .saturating_add(self.updates())
            .saturating_add(self.deletes())
    }

    /// Reset all write counters.
    pub fn reset_counters(&self) {
        self.creates.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no objects.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn check_fault(&self, operation: Operation) -> Result<()> {
        let stalled = self.stalls.read().await.contains(&operation);
        if stalled {
            trace!(?operation, "Stalling store call");
            std::future::pending::<()>().await;
        }
        match self.faults.read().await.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn emit(&self, event: WatchEvent) {
        trace!(event_type = event.event_type(), name = event.name(), "Emitting watch event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, name: &str) -> Result<Option<Resource>> {
        self.check_fault(Operation::Get).await?;
        Ok(self.objects.read().await.get(name).cloned())
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Resource>> {
        self.check_fault(Operation::List).await?;
        Ok(self
            .objects
            .read()
            .await
            .values()
            .filter(|o| selector.matches(o))
            .cloned()
            .collect())
    }

    async fn watch(&self, selector: &Selector) -> Result<WatchStream> {
        self.check_fault(Operation::Watch).await?;
        Ok(WatchStream::new(self.events.subscribe(), selector.clone()))
    }

    async fn create(&self, object: Resource) -> Result<Resource> {
        self.check_fault(Operation::Create).await?;
        if object.meta.name.is_empty() {
            return Err(StoreError::invalid("object name must not be empty"));
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(object.name()) {
            return Err(StoreError::already_exists(object.name()));
        }

        let mut created = object;
        created.meta.uid = Uid::new();
        created.meta.resource_version = 1;
        created.meta.creation_timestamp = Some(Utc::now());
        created.meta.deletion_timestamp = None;

        objects.insert(created.meta.name.clone(), created.clone());
        self.creates.fetch_add(1, Ordering::Relaxed);
        self.emit(WatchEvent::Added(created.clone()));

        Ok(created)
    }

    async fn update(&self, object: Resource) -> Result<Resource> {
        self.check_fault(Operation::Update).await?;

        let mut objects = self.objects.write().await;
        let current = objects
            .get(object.name())
            .ok_or_else(|| StoreError::not_found(object.name()))?;

        if current.meta.resource_version != object.meta.resource_version {
            return Err(StoreError::conflict(
                object.name(),
                object.meta.resource_version,
                current.meta.resource_version,
            ));
        }

        let mut updated = object;
        updated.meta.uid = current.meta.uid.clone();
        updated.meta.namespace = current.meta.namespace.clone();
        updated.meta.creation_timestamp = current.meta.creation_timestamp;
        updated.meta.deletion_timestamp = current.meta.deletion_timestamp;
        updated.meta.resource_version = current.meta.resource_version.saturating_add(1);
        self.updates.fetch_add(1, Ordering::Relaxed);

        if updated.is_deleting() && updated.meta.finalizers.is_empty() {
            objects.remove(updated.name());
            self.emit(WatchEvent::Deleted(updated.clone()));
        } else {
            objects.insert(updated.meta.name.clone(), updated.clone());
            self.emit(WatchEvent::Modified(updated.clone()));
        }

        Ok(updated)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check_fault(Operation::Delete).await?;

        let mut objects = self.objects.write().await;
        let Some(current) = objects.get_mut(name) else {
            return Err(StoreError::not_found(name));
        };
        self.deletes.fetch_add(1, Ordering::Relaxed);

        if !current.meta.finalizers.is_empty() {
            if current.meta.deletion_timestamp.is_none() {
                current.meta.deletion_timestamp = Some(Utc::now());
                current.meta.resource_version = current.meta.resource_version.saturating_add(1);
                self.emit(WatchEvent::Modified(current.clone()));
            }
            return Ok(());
        }

        if let Some(removed) = objects.remove(name) {
            self.emit(WatchEvent::Deleted(removed));
        }

        Ok(())
    }
}
