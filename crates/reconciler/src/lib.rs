//! Finalizer-gated reconciliation of master objects onto seed stores.
//!
//! Every object authored on the master store is mirrored onto every seed
//! store listed in the target registry. Remote copies converge to the
//! master's spec, and every remote copy is deleted before the master object
//! may be destroyed.
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! A pass over one master object:
//! 1. Fetches the master object (gone means nothing to do)
//! 2. If deletion was requested and our finalizer is present, deletes the
//!    copy on every target, then removes the finalizer
//! 3. Otherwise registers the finalizer, then creates or updates the copy on
//!    every target
//! 4. On failure records a `ReconcilingError` warning and returns the error
//!    so the worker retries with backoff
//!
//! ## Lifecycle
//!
//! - `Pending` - finalizer not registered yet
//! - `Active` - finalizer registered, copies kept in sync
//! - `Finalizing` - deletion requested, copies being removed
//! - `Released` - deletion requested, not ours to clean up
//!
//! ## Triggers
//!
//! Master changes enqueue the changed object. Target membership changes
//! enqueue every master object. A bounded worker pool drains the queue with
//! per-object mutual exclusion.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use seed_sync_reconciler::{
//!     Controller, InMemoryRecorder, StaticClientFactory, StoreTargetLister, SyncConfig,
//!     TargetRegistry, shutdown_channel,
//! };
//! use seed_sync_store::InMemoryObjectStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig::default();
//!     let master = Arc::new(InMemoryObjectStore::new());
//!     let membership = Arc::new(InMemoryObjectStore::new());
//!     let registry = Arc::new(TargetRegistry::new(
//!         Arc::new(StoreTargetLister::new(membership.clone(), None)),
//!         Arc::new(StaticClientFactory::new()),
//!         config.store_timeout(),
//!     ));
//!
//!     let controller = Controller::new(
//!         config,
//!         master,
//!         membership,
//!         registry,
//!         Arc::new(InMemoryRecorder::new()),
//!     )
//!     .unwrap();
//!
//!     let (stop, shutdown) = shutdown_channel();
//!     // stop.send(true) from elsewhere to stop
//!     controller.run(shutdown).await.unwrap();
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod applicator;
pub mod config;
pub mod controller;
pub mod desired;
pub mod dispatcher;
pub mod error;
pub mod finalizer;
pub mod queue;
pub mod reconciler;
pub mod recorder;
pub mod registry;
pub mod shutdown;
pub mod types;

// Re-export main types
pub use applicator::{Applied, ApplyAction, apply, apply_from};
pub use config::{BackoffConfig, ENV_PREFIX, SyncConfig, load_config};
pub use controller::Controller;
pub use desired::DesiredObject;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use finalizer::{Lifecycle, try_add_finalizer, try_remove_finalizer};
pub use queue::WorkQueue;
pub use reconciler::{RECONCILING_ERROR, Reconciler, ReconcilerBuilder};
pub use recorder::{EventRecorder, EventType, InMemoryRecorder, RecordedEvent, TracingRecorder};
pub use registry::{
    ClientFactory, StaticClientFactory, StoreTargetLister, TargetDescriptor, TargetLister,
    TargetRegistry,
};
pub use shutdown::{shutdown_channel, stopped};
pub use types::{ReconcileOutcome, TargetAction, TargetReport};
