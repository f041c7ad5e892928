//! Controller: watches, work queue and worker pool wired together.

use std::sync::Arc;

use futures::future::join_all;
use seed_sync_store::ObjectStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::queue::WorkQueue;
use crate::recorder::EventRecorder;
use crate::reconciler::Reconciler;
use crate::registry::TargetRegistry;
use crate::shutdown::stopped;
use crate::types::ReconcileOutcome;

/// Runs the sync engine until shut down.
pub struct Controller {
    config: SyncConfig,
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
    dispatcher: Arc<Dispatcher>,
}

impl Controller {
    /// Wire a controller.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate.
    pub fn new(
        config: SyncConfig,
        master: Arc<dyn ObjectStore>,
        membership: Arc<dyn ObjectStore>,
        registry: Arc<TargetRegistry>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = WorkQueue::new(config.backoff.clone());
        let reconciler = Arc::new(Reconciler::new(
            master.clone(),
            registry,
            recorder,
            config.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            master,
            membership,
            config.target_namespace.clone(),
            queue.clone(),
            config.store_timeout(),
        ));

        Ok(Self {
            config,
            queue,
            reconciler,
            dispatcher,
        })
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run until `shutdown` turns true.
    ///
    /// Opens both watches, queues every master object, then starts
    /// `workers` workers. Returns once every task has stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if a watch cannot be opened or the initial listing
    /// fails; nothing is started in that case.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            controller = %self.config.controller_name,
            workers = self.config.workers,
            "Starting controller"
        );

        // Watches first, so that nothing changed during the initial list is missed.
        let master_stream = self.dispatcher.watch_master().await?;
        let membership_stream = self.dispatcher.watch_membership().await?;
        let queued = self.dispatcher.enqueue_all().await?;
        info!(objects = queued, "Queued initial sync");

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.workers.saturating_add(2));
        {
            let dispatcher = Arc::clone(&self.dispatcher);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.run_master_watch(master_stream, shutdown).await;
            }));
        }
        {
            let dispatcher = Arc::clone(&self.dispatcher);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.run_membership_watch(membership_stream, shutdown).await;
            }));
        }
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                reconciler: Arc::clone(&self.reconciler),
            };
            tasks.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        stopped(&mut shutdown).await;
        info!(controller = %self.config.controller_name, "Shutting down controller");
        self.queue.shut_down().await;

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Controller task failed");
            }
        }
        info!(controller = %self.config.controller_name, "Controller stopped");
        Ok(())
    }

    /// Process one queued object on the calling task.
    ///
    /// Returns `None` once the queue is shut down.
    pub async fn process_next(&self) -> Option<Result<ReconcileOutcome>> {
        let key = self.queue.get().await?;
        let result = self.reconciler.reconcile(&key).await;
        finish(&self.queue, &key, &result).await;
        Some(result)
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.id, "Worker started");

        while let Some(key) = self.queue.get().await {
            tokio::select! {
                biased;
                () = stopped(&mut shutdown) => {
                    // The queue is shut down and drops pending work; the next
                    // start resyncs every object.
                    self.queue.done(&key).await;
                    break;
                }
                result = self.reconciler.reconcile(&key) => {
                    finish(&self.queue, &key, &result).await;
                }
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }
}

/// Forget the backoff of a converged key, requeue a failed one.
async fn finish(queue: &WorkQueue, key: &str, result: &Result<ReconcileOutcome>) {
    match result {
        Ok(outcome) => {
            debug!(name = key, writes = outcome.writes(), "Reconciled");
            queue.forget(key).await;
        }
        Err(e) => {
            let requeues = queue.num_requeues(key).await;
            debug!(name = key, requeues, error = %e, "Requeueing after failure");
            queue.add_rate_limited(key).await;
        }
    }
    queue.done(key).await;
}
