//! Shared fixtures for the end-to-end tests.
//!
//! A [`Harness`] holds a master store, a membership store and any number of
//! seed stores, all in memory, plus a recorder capturing warning events.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use seed_sync::reconciler::{
    Controller, InMemoryRecorder, Reconciler, StaticClientFactory, StoreTargetLister, SyncConfig,
    TargetDescriptor, TargetRegistry,
};
use seed_sync::store::{InMemoryObjectStore, ObjectStore, Resource};

pub const TARGET_NAMESPACE: &str = "kubermatic";

pub struct Harness {
    pub config: SyncConfig,
    pub master: Arc<InMemoryObjectStore>,
    pub membership: Arc<InMemoryObjectStore>,
    pub factory: Arc<StaticClientFactory>,
    pub recorder: Arc<InMemoryRecorder>,
    pub seeds: BTreeMap<String, Arc<InMemoryObjectStore>>,
}

impl Harness {
    pub fn new() -> Self {
        let config = SyncConfig {
            workers: 2,
            target_namespace: Some(TARGET_NAMESPACE.to_string()),
            store_timeout_ms: 2_000,
            ..SyncConfig::default()
        };
        Self {
            config,
            master: Arc::new(InMemoryObjectStore::new()),
            membership: Arc::new(InMemoryObjectStore::new()),
            factory: Arc::new(StaticClientFactory::new()),
            recorder: Arc::new(InMemoryRecorder::new()),
            seeds: BTreeMap::new(),
        }
    }

    /// Harness with one seed store per name.
    pub async fn with_seeds(names: &[&str]) -> Self {
        let mut harness = Self::new();
        for name in names {
            harness.add_seed(name).await;
        }
        harness
    }

    pub fn finalizer(&self) -> &str {
        &self.config.finalizer
    }

    /// Register a new seed store and publish its membership entry.
    pub async fn add_seed(&mut self, name: &str) -> Arc<InMemoryObjectStore> {
        let seed = Arc::new(InMemoryObjectStore::new());
        self.factory.register(name, seed.clone()).await;
        self.publish_membership(name).await;
        self.seeds.insert(name.to_string(), seed.clone());
        seed
    }

    /// Register the master store itself as a target.
    pub async fn add_master_as_seed(&mut self, name: &str) {
        self.factory.register(name, self.master.clone()).await;
        self.publish_membership(name).await;
    }

    async fn publish_membership(&self, name: &str) {
        self.membership
            .create(
                TargetDescriptor::new(name, format!("https://{name}.example.com"))
                    .with_namespace(TARGET_NAMESPACE)
                    .with_credentials_ref(format!("{name}-kubeconfig"))
                    .to_resource(),
            )
            .await
            .unwrap();
    }

    pub fn seed(&self, name: &str) -> &Arc<InMemoryObjectStore> {
        self.seeds.get(name).expect("unknown seed")
    }

    fn registry(&self) -> Arc<TargetRegistry> {
        let lister = StoreTargetLister::new(
            self.membership.clone(),
            self.config.target_namespace.clone(),
        );
        Arc::new(TargetRegistry::new(
            Arc::new(lister),
            self.factory.clone(),
            self.config.store_timeout(),
        ))
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.master.clone(),
            self.registry(),
            self.recorder.clone(),
            self.config.clone(),
        )
    }

    pub fn controller(&self) -> Controller {
        Controller::new(
            self.config.clone(),
            self.master.clone(),
            self.membership.clone(),
            self.registry(),
            self.recorder.clone(),
        )
        .unwrap()
    }

    pub async fn create_master(&self, name: &str, spec: serde_json::Value) -> Resource {
        self.master
            .create(Resource::new(name).with_spec(spec))
            .await
            .unwrap()
    }

    pub async fn master_object(&self, name: &str) -> Option<Resource> {
        self.master.get(name).await.unwrap()
    }

    pub async fn copy_on(&self, seed: &str, name: &str) -> Option<Resource> {
        self.seed(seed).get(name).await.unwrap()
    }

    pub fn seed_writes(&self) -> u64 {
        self.seeds.values().map(|s| s.write_count()).sum()
    }

    pub fn reset_counters(&self) {
        self.master.reset_counters();
        for seed in self.seeds.values() {
            seed.reset_counters();
        }
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
