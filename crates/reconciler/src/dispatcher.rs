//! Event source and dispatch.
//!
//! Two watches feed the work queue:
//!
//! - the master store: every change enqueues the changed object's name
//! - the membership store: every change re-enqueues every master object so
//!   that new targets receive all copies
//!
//! A watch that falls behind triggers a full resync, so no change is lost.

use std::sync::Arc;
use std::time::Duration;

use seed_sync_store::{ObjectStore, Selector, TimeoutStore, WatchRecv, WatchStream};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::queue::WorkQueue;
use crate::shutdown::stopped;

/// Turns store changes into queued object names.
pub struct Dispatcher {
    master: Arc<dyn ObjectStore>,
    membership: Arc<dyn ObjectStore>,
    membership_selector: Selector,
    queue: WorkQueue,
}

impl Dispatcher {
    /// Create a dispatcher. Membership changes are only observed in
    /// `target_namespace` when one is given. Every call to either store is
    /// bounded by `store_timeout`.
    pub fn new(
        master: Arc<dyn ObjectStore>,
        membership: Arc<dyn ObjectStore>,
        target_namespace: Option<String>,
        queue: WorkQueue,
        store_timeout: Duration,
    ) -> Self {
        let membership_selector =
            target_namespace.map_or_else(Selector::all, Selector::in_namespace);
        Self {
            master: Arc::new(TimeoutStore::new(master, store_timeout)),
            membership: Arc::new(TimeoutStore::new(membership, store_timeout)),
            membership_selector,
            queue,
        }
    }

    /// Enqueue the name of every master object.
    ///
    /// # Errors
    ///
    /// Returns `Error::ListMasters` if the master store cannot be listed.
    pub async fn enqueue_all(&self) -> Result<usize> {
        let objects = self
            .master
            .list(&Selector::all())
            .await
            .map_err(|source| Error::ListMasters { source })?;

        for object in &objects {
            self.queue.add(object.name()).await;
        }
        debug!(count = objects.len(), "Enqueued all master objects");
        Ok(objects.len())
    }

    /// Open the watch on master objects.
    ///
    /// # Errors
    ///
    /// Returns `Error::Watch` if the store refuses the watch.
    pub async fn watch_master(&self) -> Result<WatchStream> {
        self.master
            .watch(&Selector::all())
            .await
            .map_err(|e| Error::watch("master", e))
    }

    /// Open the watch on target membership.
    ///
    /// # Errors
    ///
    /// Returns `Error::Watch` if the store refuses the watch.
    pub async fn watch_membership(&self) -> Result<WatchStream> {
        self.membership
            .watch(&self.membership_selector)
            .await
            .map_err(|e| Error::watch("membership", e))
    }

    /// Enqueue every changed master object until `shutdown` or the stream
    /// closes.
    pub async fn run_master_watch(
        &self,
        mut stream: WatchStream,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let received = tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                received = stream.recv() => received,
            };

            match received {
                WatchRecv::Event(event) => {
                    trace!(
                        event_type = event.event_type(),
                        name = event.name(),
                        "Master object changed"
                    );
                    self.queue.add(event.name()).await;
                }
                WatchRecv::Lagged(missed) => {
                    warn!(missed, "Master watch fell behind, resyncing");
                    self.resync().await;
                }
                WatchRecv::Closed => {
                    info!("Master watch closed");
                    break;
                }
            }
        }
    }

    /// Enqueue every master object on each membership change until
    /// `shutdown` or the stream closes.
    pub async fn run_membership_watch(
        &self,
        mut stream: WatchStream,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let received = tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                received = stream.recv() => received,
            };

            match received {
                WatchRecv::Event(event) => {
                    debug!(
                        event_type = event.event_type(),
                        target = event.name(),
                        "Target membership changed"
                    );
                    self.resync().await;
                }
                WatchRecv::Lagged(missed) => {
                    warn!(missed, "Membership watch fell behind, resyncing");
                    self.resync().await;
                }
                WatchRecv::Closed => {
                    info!("Membership watch closed");
                    break;
                }
            }
        }
    }

    /// Enqueue everything; a listing failure skips this round.
    async fn resync(&self) {
        if let Err(e) = self.enqueue_all().await {
            warn!(error = %e, "Failed to enqueue master objects");
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use seed_sync_store::{InMemoryObjectStore, Operation, Resource, StoreError};

    use super::*;
    use crate::config::BackoffConfig;
    use crate::registry::TargetDescriptor;

    struct Fixture {
        master: Arc<InMemoryObjectStore>,
        membership: Arc<InMemoryObjectStore>,
        queue: WorkQueue,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture(namespace: Option<&str>) -> Fixture {
        let master = Arc::new(InMemoryObjectStore::new());
        let membership = Arc::new(InMemoryObjectStore::new());
        let queue = WorkQueue::new(BackoffConfig::default());
        let dispatcher = Arc::new(Dispatcher::new(
            master.clone(),
            membership.clone(),
            namespace.map(str::to_string),
            queue.clone(),
            Duration::from_secs(5),
        ));
        Fixture {
            master,
            membership,
            queue,
            dispatcher,
        }
    }

    async fn eventually_len(queue: &WorkQueue, expected: usize) {
        for _ in 0..100 {
            if queue.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.len().await, expected);
    }

    #[tokio::test]
    async fn test_enqueue_all() {
        let f = fixture(None);
        for name in ["alpha", "beta", "gamma"] {
            f.master.create(Resource::new(name)).await.unwrap();
        }

        assert_eq!(f.dispatcher.enqueue_all().await.unwrap(), 3);
        assert_eq!(f.queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_enqueue_all_surfaces_list_failure() {
        let f = fixture(None);
        f.master
            .inject_fault(Operation::List, StoreError::transport("list", "down"))
            .await;

        assert!(matches!(
            f.dispatcher.enqueue_all().await,
            Err(Error::ListMasters { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_master_list_times_out() {
        let f = fixture(None);
        f.master.stall(Operation::List).await;

        let result = tokio::time::timeout(Duration::from_secs(60), f.dispatcher.enqueue_all())
            .await
            .unwrap();

        assert!(matches!(
            result,
            Err(Error::ListMasters {
                source: StoreError::Timeout { .. }
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_membership_watch_times_out() {
        let f = fixture(Some("kubermatic"));
        f.membership.stall(Operation::Watch).await;

        let result = tokio::time::timeout(Duration::from_secs(60), f.dispatcher.watch_membership())
            .await
            .unwrap();

        assert!(matches!(result, Err(Error::Watch { .. })));
    }

    #[tokio::test]
    async fn test_master_watch_enqueues_changed_names() {
        let f = fixture(None);
        let (stop, shutdown) = watch::channel(false);
        let stream = f.dispatcher.watch_master().await.unwrap();
        let task = {
            let dispatcher = f.dispatcher.clone();
            tokio::spawn(async move { dispatcher.run_master_watch(stream, shutdown).await })
        };

        f.master.create(Resource::new("alpha")).await.unwrap();
        f.master.create(Resource::new("beta")).await.unwrap();
        eventually_len(&f.queue, 2).await;

        stop.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_membership_change_fans_out_in_namespace_only() {
        let f = fixture(Some("kubermatic"));
        f.master.create(Resource::new("alpha")).await.unwrap();
        f.master.create(Resource::new("beta")).await.unwrap();
        let (stop, shutdown) = watch::channel(false);
        let stream = f.dispatcher.watch_membership().await.unwrap();
        let task = {
            let dispatcher = f.dispatcher.clone();
            tokio::spawn(async move { dispatcher.run_membership_watch(stream, shutdown).await })
        };

        f.membership
            .create(
                TargetDescriptor::new("seed-x", "https://seed-x")
                    .with_namespace("elsewhere")
                    .to_resource(),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.queue.is_empty().await);

        f.membership
            .create(
                TargetDescriptor::new("seed-c", "https://seed-c")
                    .with_namespace("kubermatic")
                    .to_resource(),
            )
            .await
            .unwrap();
        eventually_len(&f.queue, 2).await;

        stop.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_lagged_master_watch_resyncs() {
        let master = Arc::new(InMemoryObjectStore::with_watch_capacity(1));
        let membership = Arc::new(InMemoryObjectStore::new());
        let queue = WorkQueue::new(BackoffConfig::default());
        let dispatcher = Dispatcher::new(
            master.clone(),
            membership,
            None,
            queue.clone(),
            Duration::from_secs(5),
        );
        let stream = dispatcher.watch_master().await.unwrap();

        for name in ["alpha", "beta", "gamma"] {
            master.create(Resource::new(name)).await.unwrap();
        }
        // Only the last event is still buffered; the lag triggers a resync.
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(async move { dispatcher.run_master_watch(stream, shutdown).await });

        eventually_len(&queue, 3).await;
        stop.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_before_start_returns_immediately() {
        let f = fixture(None);
        let (_stop, shutdown) = watch::channel(true);
        let stream = f.dispatcher.watch_master().await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            f.dispatcher.run_master_watch(stream, shutdown),
        )
        .await
        .unwrap();
    }
}
