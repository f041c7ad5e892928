//! Finalizer protocol and lifecycle of a master object.
//!
//! Finalizers form a cooperative, multi-owner pre-destroy hook: the store
//! destroys a deleting object only once every owner removed its marker.
//! This controller only ever adds or removes its own marker, and only through
//! conditional updates.

use seed_sync_store::{ObjectStore, Resource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Lifecycle of a master object as seen by one controller.
///
/// ```text
/// Pending --add marker--> Active --deletion requested--> Finalizing
/// Finalizing --all copies gone, marker removed--> (destroyed by the store)
/// Finalizing --any target fails--> Finalizing (retried)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Not deleting, our marker not registered yet.
    Pending,
    /// Not deleting, our marker registered.
    Active,
    /// Deletion requested while our marker is present: copies must go first.
    Finalizing,
    /// Deletion requested and our marker is absent: nothing for us to clean.
    Released,
}

impl Lifecycle {
    /// Classify an object for the given finalizer.
    pub fn of(object: &Resource, finalizer: &str) -> Self {
        match (object.is_deleting(), object.has_finalizer(finalizer)) {
            (false, false) => Self::Pending,
            (false, true) => Self::Active,
            (true, true) => Self::Finalizing,
            (true, false) => Self::Released,
        }
    }

    /// Whether deletion was requested.
    pub const fn is_deleting(self) -> bool {
        matches!(self, Self::Finalizing | Self::Released)
    }
}

/// Add `finalizer` to `object` unless already present.
///
/// Returns the stored object; no write happens when the marker is already
/// registered.
///
/// # Errors
///
/// Returns `Error::AddFinalizer`; a conflict means the object changed since
/// it was read and the pass must be retried.
pub async fn try_add_finalizer(
    store: &dyn ObjectStore,
    object: &Resource,
    finalizer: &str,
) -> Result<Resource> {
    if object.has_finalizer(finalizer) {
        return Ok(object.clone());
    }

    let mut updated = object.clone();
    updated.meta.finalizers.push(finalizer.to_string());

    let stored = store
        .update(updated)
        .await
        .map_err(|source| Error::AddFinalizer {
            name: object.name().to_string(),
            finalizer: finalizer.to_string(),
            source,
        })?;
    debug!(name = object.name(), finalizer, "Added finalizer");
    Ok(stored)
}

/// Remove `finalizer` from `object` if present.
///
/// Removing the last marker of a deleting object lets the store destroy it.
///
/// # Errors
///
/// Returns `Error::RemoveFinalizer`; conflicts are retryable.
pub async fn try_remove_finalizer(
    store: &dyn ObjectStore,
    object: &Resource,
    finalizer: &str,
) -> Result<Resource> {
    if !object.has_finalizer(finalizer) {
        return Ok(object.clone());
    }

    let mut updated = object.clone();
    updated.meta.finalizers.retain(|f| f != finalizer);

    let stored = store
        .update(updated)
        .await
        .map_err(|source| Error::RemoveFinalizer {
            name: object.name().to_string(),
            finalizer: finalizer.to_string(),
            source,
        })?;
    debug!(name = object.name(), finalizer, "Removed finalizer");
    Ok(stored)
}
