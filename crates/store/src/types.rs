//! Core object model shared by the master store and every seed store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Store-assigned identity token.
///
/// Assigned once when an object is created and never changed afterwards.
/// Each store assigns its own tokens, so two copies of the same object in
/// different stores carry different uids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(String);

impl Uid {
    /// Create a new random uid.
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    /// The uid of an object that has never been persisted.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Check whether the uid is unset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata carried by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Unique, immutable name.
    pub name: String,
    /// Namespace, `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Identity token assigned by the store on creation.
    pub uid: Uid,
    /// Optimistic concurrency token, bumped on every write.
    pub resource_version: u64,
    /// Free-form labels used by selectors.
    pub labels: BTreeMap<String, String>,
    /// Pre-delete markers. Ordered, no duplicates.
    pub finalizers: Vec<String>,
    /// Set by the store on creation.
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Deletion-requested marker. Set once by the store, never cleared.
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Create metadata for an unpersisted object.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A declarative resource: metadata plus an opaque spec payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired-state payload, mirrored verbatim.
    pub spec: serde_json::Value,
}

impl Resource {
    /// Create an empty, unpersisted resource with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::named(name),
            spec: serde_json::Value::Null,
        }
    }

    /// Set the spec payload.
    #[must_use]
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.meta.namespace = Some(namespace.into());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.labels.insert(key.into(), value.into());
        self
    }

    /// Add a finalizer if it is not present yet.
    #[must_use]
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        let finalizer = finalizer.into();
        if !self.has_finalizer(&finalizer) {
            self.meta.finalizers.push(finalizer);
        }
        self
    }

    /// The object name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The object uid.
    pub fn uid(&self) -> &Uid {
        &self.meta.uid
    }

    /// Whether deletion was requested.
    pub fn is_deleting(&self) -> bool {
        self.meta.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is registered.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.meta.finalizers.iter().any(|f| f == finalizer)
    }
}

/// Filter for list and watch calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    /// Restrict to a namespace.
    pub namespace: Option<String>,
    /// Required label values.
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    /// Match every object.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match objects in one namespace.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            labels: BTreeMap::new(),
        }
    }

    /// Require a label value.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Check if an object matches this selector.
    pub fn matches(&self, object: &Resource) -> bool {
        let namespace_ok = self
            .namespace
            .as_ref()
            .is_none_or(|ns| object.meta.namespace.as_ref() == Some(ns));

        namespace_ok
            && self
                .labels
                .iter()
                .all(|(k, v)| object.meta.labels.get(k) == Some(v))
    }
}

/// A change observed on a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Object created.
    Added(Resource),
    /// Object updated, including a deletion request on a finalized object.
    Modified(Resource),
    /// Object removed from the store.
    Deleted(Resource),
}

impl WatchEvent {
    /// The object carried by the event.
    pub fn object(&self) -> &Resource {
        match self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => o,
        }
    }

    /// Name of the object carried by the event.
    pub fn name(&self) -> &str {
        self.object().name()
    }

    /// Short event type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}
