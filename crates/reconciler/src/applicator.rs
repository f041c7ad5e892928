//! Desired-state applicator.
//!
//! Get-or-create-then-update-if-different against a single store. Applying
//! the same [`DesiredObject`] twice performs no second write.

use seed_sync_store::{ObjectStore, Resource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::desired::DesiredObject;
use crate::error::{Error, Result};

/// What the applicator did to the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyAction {
    /// The object did not exist and was created.
    Created,
    /// The object differed and was updated.
    Updated,
    /// The object already matched; nothing was written.
    Unchanged,
}

/// Result of one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The object as stored after the call.
    pub object: Resource,
    /// Write performed, if any.
    pub action: ApplyAction,
}

/// Converge one object in `client` to `desired`.
///
/// An absent object is not an error; it is rendered from an empty starting
/// object and created.
///
/// # Errors
///
/// - `Error::Apply` wrapping the store error verbatim (retryable, including
///   update conflicts)
/// - `Error::Render` if the mutation fails or renames the object
pub async fn apply(client: &dyn ObjectStore, desired: &DesiredObject) -> Result<Applied> {
    let current = client
        .get(desired.name())
        .await
        .map_err(|source| Error::Apply {
            name: desired.name().to_string(),
            source,
        })?;
    apply_from(client, current, desired).await
}

/// Converge one object in `client` to `desired`, starting from `current` as
/// already read from `client`. Performs at most one write and no read.
///
/// # Errors
///
/// Same as [`apply`].
pub async fn apply_from(
    client: &dyn ObjectStore,
    current: Option<Resource>,
    desired: &DesiredObject,
) -> Result<Applied> {
    let name = desired.name();
    let apply_err = |source| Error::Apply {
        name: name.to_string(),
        source,
    };

    let Some(current) = current else {
        let rendered = render_checked(desired, Resource::new(name))?;
        let object = client.create(rendered).await.map_err(apply_err)?;
        debug!(name, uid = %object.uid(), "Created object");
        return Ok(Applied {
            object,
            action: ApplyAction::Created,
        });
    };

    let rendered = render_checked(desired, current.clone())?;
    if rendered == current {
        return Ok(Applied {
            object: current,
            action: ApplyAction::Unchanged,
        });
    }

    let object = client.update(rendered).await.map_err(apply_err)?;
    debug!(
        name,
        resource_version = object.meta.resource_version,
        "Updated object"
    );
    Ok(Applied {
        object,
        action: ApplyAction::Updated,
    })
}

fn render_checked(desired: &DesiredObject, base: Resource) -> Result<Resource> {
    let rendered = desired.render(base)?;
    if rendered.name() != desired.name() {
        return Err(Error::render(
            desired.name(),
            format!("mutation renamed the object to '{}'", rendered.name()),
        ));
    }
    Ok(rendered)
}
