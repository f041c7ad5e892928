//! Desired-state descriptors.
//!
//! A [`DesiredObject`] names an object and carries a pure mutation that fills
//! in the desired fields. It performs no I/O; the applicator decides whether
//! a write is needed.

use std::fmt;
use std::sync::Arc;

use seed_sync_store::Resource;

use crate::error::Result;

type Mutation = dyn Fn(Resource) -> Result<Resource> + Send + Sync;

/// A named, pure description of the desired state of one object.
#[derive(Clone)]
pub struct DesiredObject {
    name: String,
    mutate: Arc<Mutation>,
}

impl DesiredObject {
    /// Create a descriptor from a name and a mutation.
    ///
    /// `mutate` must be a pure function of its input so that applying it
    /// again to its own output changes nothing.
    pub fn new<F>(name: impl Into<String>, mutate: F) -> Self
    where
        F: Fn(Resource) -> Result<Resource> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            mutate: Arc::new(mutate),
        }
    }

    /// Desired state of a remote copy of `master`: same name, same spec.
    pub fn mirror_of(master: &Resource) -> Self {
        let name = master.name().to_string();
        let spec = master.spec.clone();
        let copy_name = name.clone();

        Self::new(name, move |mut copy| {
            copy.meta.name.clone_from(&copy_name);
            copy.spec = spec.clone();
            Ok(copy)
        })
    }

    /// Name of the described object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the mutation to a starting object.
    ///
    /// # Errors
    ///
    /// Returns whatever error the mutation raises.
    pub fn render(&self, base: Resource) -> Result<Resource> {
        (self.mutate)(base)
    }
}

impl fmt::Debug for DesiredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesiredObject")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
