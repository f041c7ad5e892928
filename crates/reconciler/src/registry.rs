//! Target registry: which seed stores exist and how to reach them.
//!
//! The set of targets is exogenous and may change at any time. It is read
//! once at the start of each pass; no snapshot is kept between passes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use seed_sync_store::{ObjectStore, Resource, Selector, TimeoutStore};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Identifies one remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Unique target name.
    pub name: String,
    /// Namespace of the membership entry.
    pub namespace: Option<String>,
    /// Address of the remote store.
    pub endpoint: String,
    /// Reference to the credentials used to reach the store.
    pub credentials_ref: Option<String>,
}

/// Connection parameters as stored in a membership entry's spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionSpec {
    endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials_ref: Option<String>,
}

impl TargetDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            endpoint: endpoint.into(),
            credentials_ref: None,
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the credentials reference.
    #[must_use]
    pub fn with_credentials_ref(mut self, credentials_ref: impl Into<String>) -> Self {
        self.credentials_ref = Some(credentials_ref.into());
        self
    }

    /// Parse a membership entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTarget` if the spec lacks connection parameters.
    pub fn from_resource(entry: &Resource) -> Result<Self> {
        let spec: ConnectionSpec = serde_json::from_value(entry.spec.clone())
            .map_err(|e| Error::invalid_target(entry.name(), e.to_string()))?;

        if spec.endpoint.trim().is_empty() {
            return Err(Error::invalid_target(entry.name(), "endpoint is empty"));
        }

        Ok(Self {
            name: entry.name().to_string(),
            namespace: entry.meta.namespace.clone(),
            endpoint: spec.endpoint,
            credentials_ref: spec.credentials_ref,
        })
    }

    /// Render the membership entry describing this target.
    pub fn to_resource(&self) -> Resource {
        let spec = ConnectionSpec {
            endpoint: self.endpoint.clone(),
            credentials_ref: self.credentials_ref.clone(),
        };
        let entry = Resource::new(&self.name)
            .with_spec(serde_json::to_value(spec).unwrap_or(serde_json::Value::Null));
        match &self.namespace {
            Some(ns) => entry.with_namespace(ns),
            None => entry,
        }
    }
}

/// Supplies the current list of targets.
#[async_trait]
pub trait TargetLister: Send + Sync {
    /// List every target, in the order passes should visit them.
    async fn list_targets(&self) -> Result<Vec<TargetDescriptor>>;
}

#[async_trait]
impl<F> TargetLister for F
where
    F: Fn() -> Result<Vec<TargetDescriptor>> + Send + Sync,
{
    async fn list_targets(&self) -> Result<Vec<TargetDescriptor>> {
        self()
    }
}

/// Lists targets from membership entries held in an object store.
pub struct StoreTargetLister {
    store: Arc<dyn ObjectStore>,
    selector: Selector,
}

impl StoreTargetLister {
    /// List entries from `store`, restricted to `namespace` when given.
    pub fn new(store: Arc<dyn ObjectStore>, namespace: Option<String>) -> Self {
        let selector = namespace.map_or_else(Selector::all, Selector::in_namespace);
        Self { store, selector }
    }
}

#[async_trait]
impl TargetLister for StoreTargetLister {
    async fn list_targets(&self) -> Result<Vec<TargetDescriptor>> {
        let entries = self
            .store
            .list(&self.selector)
            .await
            .map_err(|e| Error::list_targets(e.to_string()))?;

        entries.iter().map(TargetDescriptor::from_resource).collect()
    }
}

/// Builds a client for one target.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Get a client for `target`.
    async fn client_for(&self, target: &TargetDescriptor) -> Result<Arc<dyn ObjectStore>>;
}

/// Client factory backed by a fixed, runtime-editable map of stores.
#[derive(Default)]
pub struct StaticClientFactory {
    clients: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl StaticClientFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the store reached for target `name`.
    pub async fn register(&self, name: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.clients.write().await.insert(name.into(), store);
    }

    /// Forget target `name`.
    pub async fn deregister(&self, name: &str) {
        self.clients.write().await.remove(name);
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn client_for(&self, target: &TargetDescriptor) -> Result<Arc<dyn ObjectStore>> {
        self.clients
            .read()
            .await
            .get(&target.name)
            .cloned()
            .ok_or_else(|| Error::target_client(&target.name, "no client registered"))
    }
}

/// The authoritative list of targets plus a way to reach each of them.
pub struct TargetRegistry {
    lister: Arc<dyn TargetLister>,
    factory: Arc<dyn ClientFactory>,
    store_timeout: Duration,
}

impl TargetRegistry {
    /// Create a registry. Listing targets and every client call are bounded
    /// by `store_timeout`.
    pub fn new(
        lister: Arc<dyn TargetLister>,
        factory: Arc<dyn ClientFactory>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            lister,
            factory,
            store_timeout,
        }
    }

    /// Current targets.
    ///
    /// # Errors
    ///
    /// Returns the lister's error, `Error::ListTargets` if listing outlasts
    /// the store timeout, or `Error::InvalidTarget` if a name is listed twice;
    /// the pass must abort.
    pub async fn targets(&self) -> Result<Vec<TargetDescriptor>> {
        let targets = tokio::time::timeout(self.store_timeout, self.lister.list_targets())
            .await
            .map_err(|_| {
                Error::list_targets(format!(
                    "timed out after {}ms",
                    self.store_timeout.as_millis()
                ))
            })??;
        if let Some(name) = targets.iter().map(|t| t.name.as_str()).duplicates().next() {
            return Err(Error::invalid_target(name, "listed more than once"));
        }
        Ok(targets)
    }

    /// A client for `target`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TargetClient` if no client can be built.
    pub async fn client(&self, target: &TargetDescriptor) -> Result<Arc<dyn ObjectStore>> {
        let client = self.factory.client_for(target).await?;
        Ok(Arc::new(TimeoutStore::new(client, self.store_timeout)))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use seed_sync_store::{InMemoryObjectStore, Operation, StoreError};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_descriptor_resource_round_trip() {
        let target = TargetDescriptor::new("seed-a", "https://seed-a.example.com")
            .with_namespace("kubermatic")
            .with_credentials_ref("seed-a-kubeconfig");

        let entry = target.to_resource();
        assert_eq!(
            entry.spec.get("endpoint"),
            Some(&json!("https://seed-a.example.com"))
        );
        assert_eq!(
            entry.spec.get("credentialsRef"),
            Some(&json!("seed-a-kubeconfig"))
        );
        assert_eq!(TargetDescriptor::from_resource(&entry).unwrap(), target);
    }

    #[test]
    fn test_descriptor_requires_endpoint() {
        let entry = Resource::new("seed-a").with_spec(json!({"endpoint": " "}));
        assert!(matches!(
            TargetDescriptor::from_resource(&entry),
            Err(Error::InvalidTarget { .. })
        ));

        let entry = Resource::new("seed-b").with_spec(json!({"region": "eu"}));
        assert!(TargetDescriptor::from_resource(&entry).is_err());
    }

    #[tokio::test]
    async fn test_store_lister_filters_namespace_and_orders_by_name() {
        let membership = Arc::new(InMemoryObjectStore::new());
        for (name, ns) in [("seed-b", "kubermatic"), ("seed-a", "kubermatic"), ("seed-x", "other")] {
            membership
                .create(
                    TargetDescriptor::new(name, format!("https://{name}"))
                        .with_namespace(ns)
                        .to_resource(),
                )
                .await
                .unwrap();
        }

        let lister = StoreTargetLister::new(membership, Some("kubermatic".to_string()));
        let names: Vec<String> = lister
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();

        assert_eq!(names, vec!["seed-a", "seed-b"]);
    }

    #[tokio::test]
    async fn test_store_lister_surfaces_list_failure() {
        let membership = Arc::new(InMemoryObjectStore::new());
        membership
            .inject_fault(Operation::List, StoreError::transport("list", "down"))
            .await;

        let lister = StoreTargetLister::new(membership, None);
        assert!(matches!(
            lister.list_targets().await,
            Err(Error::ListTargets { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_membership_listing_times_out() {
        let membership = Arc::new(InMemoryObjectStore::new());
        membership.stall(Operation::List).await;
        let registry = TargetRegistry::new(
            Arc::new(StoreTargetLister::new(membership, None)),
            Arc::new(StaticClientFactory::new()),
            Duration::from_millis(50),
        );

        let result = tokio::time::timeout(Duration::from_secs(60), registry.targets())
            .await
            .unwrap();

        assert!(matches!(result, Err(Error::ListTargets { .. })));
    }

    #[tokio::test]
    async fn test_closure_lister() {
        let lister = || -> Result<Vec<TargetDescriptor>> {
            Ok(vec![TargetDescriptor::new("seed-a", "https://seed-a")])
        };
        let registry = TargetRegistry::new(
            Arc::new(lister),
            Arc::new(StaticClientFactory::new()),
            Duration::from_secs(1),
        );

        assert_eq!(registry.targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_target_names_are_rejected() {
        let lister = || -> Result<Vec<TargetDescriptor>> {
            Ok(vec![
                TargetDescriptor::new("seed-a", "https://seed-a"),
                TargetDescriptor::new("seed-a", "https://seed-a-2"),
            ])
        };
        let registry = TargetRegistry::new(
            Arc::new(lister),
            Arc::new(StaticClientFactory::new()),
            Duration::from_secs(1),
        );

        assert!(matches!(
            registry.targets().await,
            Err(Error::InvalidTarget { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_target_has_no_client() {
        let factory = Arc::new(StaticClientFactory::new());
        let registry = TargetRegistry::new(
            Arc::new(|| -> Result<Vec<TargetDescriptor>> { Ok(Vec::new()) }),
            factory.clone(),
            Duration::from_secs(1),
        );
        let target = TargetDescriptor::new("seed-a", "https://seed-a");

        assert!(matches!(
            registry.client(&target).await,
            Err(Error::TargetClient { .. })
        ));

        factory
            .register("seed-a", Arc::new(InMemoryObjectStore::new()))
            .await;
        assert!(registry.client(&target).await.is_ok());

        factory.deregister("seed-a").await;
        assert!(registry.client(&target).await.is_err());
    }
}
