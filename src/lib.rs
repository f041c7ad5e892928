#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # seed-sync
//!
//! Mirrors objects authored on a master store onto every seed store, keeps
//! each remote copy converged to the master's spec, and removes every remote
//! copy before the master object may be destroyed.
//!
//! This library re-exports the workspace crates and wires the standard
//! controller.

use std::sync::Arc;

pub use seed_sync_reconciler as reconciler;
pub use seed_sync_store as store;

pub use seed_sync_reconciler::{
    ClientFactory, Controller, Error, EventRecorder, ReconcileOutcome, Reconciler,
    StaticClientFactory, StoreTargetLister, SyncConfig, TargetDescriptor, TargetRegistry,
    TracingRecorder, load_config, shutdown_channel,
};
pub use seed_sync_store::{InMemoryObjectStore, ObjectStore, Resource, StoreError};

pub mod telemetry;

/// Build a controller whose targets are the membership entries found in
/// `membership` (restricted to `config.target_namespace`), reached through
/// `factory`, with events reported through tracing.
///
/// # Errors
///
/// Returns `Error::InvalidConfig` if `config` does not validate.
pub fn standard_controller(
    config: SyncConfig,
    master: Arc<dyn ObjectStore>,
    membership: Arc<dyn ObjectStore>,
    factory: Arc<dyn ClientFactory>,
) -> seed_sync_reconciler::Result<Controller> {
    let lister = StoreTargetLister::new(Arc::clone(&membership), config.target_namespace.clone());
    let registry = Arc::new(TargetRegistry::new(
        Arc::new(lister),
        factory,
        config.store_timeout(),
    ));
    let recorder = Arc::new(TracingRecorder::new(config.controller_name.clone()));

    Controller::new(config, master, membership, registry, recorder)
}
