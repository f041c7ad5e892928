//! Reconciler: one pass over one master object.
//!
//! A pass is a pure function of the current observed state. It either
//! converges every target or fails at the first failing target; nothing
//! survives between passes except what is stored in the stores themselves.

use std::sync::Arc;

use seed_sync_store::{ObjectStore, Resource, TimeoutStore};
use tracing::{debug, info, warn};

use crate::applicator::apply_from;
use crate::config::SyncConfig;
use crate::desired::DesiredObject;
use crate::error::{Error, Result};
use crate::finalizer::{Lifecycle, try_add_finalizer, try_remove_finalizer};
use crate::recorder::{EventRecorder, RecordedEvent, TracingRecorder};
use crate::registry::{TargetDescriptor, TargetRegistry};
use crate::types::{ReconcileOutcome, TargetAction};

/// Reason recorded with the warning event of a failed pass.
pub const RECONCILING_ERROR: &str = "ReconcilingError";

/// Mirrors master objects onto every target.
pub struct Reconciler {
    master: Arc<dyn ObjectStore>,
    registry: Arc<TargetRegistry>,
    recorder: Arc<dyn EventRecorder>,
    config: SyncConfig,
}

impl Reconciler {
    /// Create a reconciler. Calls to `master` are bounded by the configured
    /// store timeout.
    pub fn new(
        master: Arc<dyn ObjectStore>,
        registry: Arc<TargetRegistry>,
        recorder: Arc<dyn EventRecorder>,
        config: SyncConfig,
    ) -> Self {
        let master: Arc<dyn ObjectStore> =
            Arc::new(TimeoutStore::new(master, config.store_timeout()));
        Self {
            master,
            registry,
            recorder,
            config,
        }
    }

    /// Reconcile the master object called `name`.
    ///
    /// # Errors
    ///
    /// Every error is retryable. When the master object could be read, the
    /// error is also recorded on it as a warning event.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome> {
        debug!(name, "Reconciling");

        let master = match self.master.get(name).await {
            Ok(Some(master)) => master,
            Ok(None) => {
                debug!(name, "Master object not found, nothing to do");
                return Ok(ReconcileOutcome::absent(name));
            }
            Err(source) => {
                let err = Error::fetch(name, source);
                warn!(name, error = %err, "Reconciling failed");
                return Err(err);
            }
        };

        match self.reconcile_object(&master).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(name, error = %err, "Reconciling failed");
                self.recorder
                    .record(RecordedEvent::warning(
                        &master,
                        RECONCILING_ERROR,
                        err.to_string(),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn reconcile_object(&self, master: &Resource) -> Result<ReconcileOutcome> {
        let phase = Lifecycle::of(master, &self.config.finalizer);
        let mut outcome = ReconcileOutcome::new(master.name(), phase);

        match phase {
            Lifecycle::Released => {
                debug!(name = master.name(), "Deleting without our finalizer, skipping");
            }
            Lifecycle::Finalizing => self.cleanup(master, &mut outcome).await?,
            Lifecycle::Pending | Lifecycle::Active => self.sync(master, &mut outcome).await?,
        }

        Ok(outcome)
    }

    /// Delete the copy on every target, then release the master object.
    async fn cleanup(&self, master: &Resource, outcome: &mut ReconcileOutcome) -> Result<()> {
        let name = master.name();

        for target in self.registry.targets().await? {
            let action = self
                .delete_copy(name, &target)
                .await
                .map_err(|e| Error::target_sync(name, &target.name, e))?;
            debug!(name, target = %target.name, action = ?action, "Cleaned up target");
            outcome.push(&target.name, action);
        }

        try_remove_finalizer(self.master.as_ref(), master, &self.config.finalizer).await?;
        info!(
            name,
            targets = outcome.targets.len(),
            "Removed copies from all targets, released finalizer"
        );
        Ok(())
    }

    async fn delete_copy(&self, name: &str, target: &TargetDescriptor) -> Result<TargetAction> {
        let client = self.registry.client(target).await?;
        match client.delete(name).await {
            Ok(()) => Ok(TargetAction::Deleted),
            Err(e) if e.is_not_found() => Ok(TargetAction::AlreadyAbsent),
            Err(source) => Err(Error::Delete {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Register our finalizer, then converge the copy on every target.
    async fn sync(&self, master: &Resource, outcome: &mut ReconcileOutcome) -> Result<()> {
        let name = master.name();

        if outcome.phase == Some(Lifecycle::Pending) {
            try_add_finalizer(self.master.as_ref(), master, &self.config.finalizer).await?;
            info!(name, finalizer = %self.config.finalizer, "Registered finalizer");
        }

        let desired = DesiredObject::mirror_of(master);
        for target in self.registry.targets().await? {
            let action = self
                .sync_copy(master, &desired, &target)
                .await
                .map_err(|e| Error::target_sync(name, &target.name, e))?;
            debug!(name, target = %target.name, action = ?action, "Reconciled with target");
            outcome.push(&target.name, action);
        }

        Ok(())
    }

    async fn sync_copy(
        &self,
        master: &Resource,
        desired: &DesiredObject,
        target: &TargetDescriptor,
    ) -> Result<TargetAction> {
        let client = self.registry.client(target).await?;

        let copy = client
            .get(master.name())
            .await
            .map_err(|e| Error::fetch(master.name(), e))?;
        if copy
            .as_ref()
            .is_some_and(|c| !c.uid().is_empty() && c.uid() == master.uid())
        {
            return Ok(TargetAction::SameIdentity);
        }

        let applied = apply_from(client.as_ref(), copy, desired).await?;
        Ok(applied.action.into())
    }
}

/// Builder for [`Reconciler`].
#[derive(Default)]
pub struct ReconcilerBuilder {
    master: Option<Arc<dyn ObjectStore>>,
    registry: Option<Arc<TargetRegistry>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    config: SyncConfig,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the master store.
    #[must_use]
    pub fn with_master(mut self, master: Arc<dyn ObjectStore>) -> Self {
        self.master = Some(master);
        self
    }

    /// Set the target registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TargetRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set a custom event recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the reconciler. Defaults to a [`TracingRecorder`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the master store or the registry is
    /// missing, or if the configuration is invalid.
    pub fn build(self) -> Result<Reconciler> {
        let master = self
            .master
            .ok_or_else(|| Error::invalid_config("master store is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| Error::invalid_config("target registry is required"))?;
        self.config.validate()?;

        let recorder = self.recorder.unwrap_or_else(|| {
            Arc::new(TracingRecorder::new(self.config.controller_name.clone()))
        });

        Ok(Reconciler::new(master, registry, recorder, self.config))
    }
}
