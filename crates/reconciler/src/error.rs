//! Error types for the reconciler crate.

use std::path::PathBuf;

use seed_sync_store::StoreError;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
///
/// Every error raised during a pass is retryable: the worker requeues the
/// object with backoff. Only configuration errors are fatal, and those are
/// raised before the controller starts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to get '{name}': {source}")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to list master objects: {source}")]
    ListMasters {
        #[source]
        source: StoreError,
    },

    #[error("failed to watch the {store} store: {source}")]
    Watch {
        store: String,
        #[source]
        source: StoreError,
    },

    #[error("failed listing targets: {reason}")]
    ListTargets { reason: String },

    #[error("invalid target descriptor '{name}': {reason}")]
    InvalidTarget { name: String, reason: String },

    #[error("failed getting client for target '{target}': {reason}")]
    TargetClient { target: String, reason: String },

    #[error("failed syncing '{name}' to target '{target}': {source}")]
    TargetSync {
        name: String,
        target: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to apply '{name}': {source}")]
    Apply {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete '{name}': {source}")]
    Delete {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to render desired state for '{name}': {reason}")]
    Render { name: String, reason: String },

    #[error("failed to add finalizer '{finalizer}' to '{name}': {source}")]
    AddFinalizer {
        name: String,
        finalizer: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to remove finalizer '{finalizer}' from '{name}': {source}")]
    RemoveFinalizer {
        name: String,
        finalizer: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to load configuration from '{path}': {reason}")]
    ConfigLoad { path: PathBuf, reason: String },
}

impl Error {
    /// Create a fetch error.
    pub fn fetch(name: impl Into<String>, source: StoreError) -> Self {
        Self::Fetch {
            name: name.into(),
            source,
        }
    }

    /// Create a watch error.
    pub fn watch(store: impl Into<String>, source: StoreError) -> Self {
        Self::Watch {
            store: store.into(),
            source,
        }
    }

    /// Create a target listing error.
    pub fn list_targets(reason: impl Into<String>) -> Self {
        Self::ListTargets {
            reason: reason.into(),
        }
    }

    /// Create an invalid target descriptor error.
    pub fn invalid_target(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a target client error.
    pub fn target_client(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TargetClient {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised while syncing one target.
    pub fn target_sync(name: impl Into<String>, target: impl Into<String>, source: Self) -> Self {
        Self::TargetSync {
            name: name.into(),
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Create a render error.
    pub fn render(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a config load error.
    pub fn config_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The store error at the root of this error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Fetch { source, .. }
            | Self::ListMasters { source }
            | Self::Watch { source, .. }
            | Self::Apply { source, .. }
            | Self::Delete { source, .. }
            | Self::AddFinalizer { source, .. }
            | Self::RemoveFinalizer { source, .. } => Some(source),
            Self::TargetSync { source, .. } => source.store_error(),
            _ => None,
        }
    }

    /// Whether the error was caused by an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_conflict)
    }
}
