//! Object store interface for seed-sync.
//!
//! The sync engine talks to the master store, to every seed store and to the
//! store holding target membership through one narrow interface:
//!
//! - **Object model**: [`Resource`] with [`ObjectMeta`] (uid, resource
//!   version, finalizers, deletion marker) and an opaque JSON spec
//! - **Store trait**: [`ObjectStore`] with get/list/watch/create/update/delete
//! - **In-memory store**: [`InMemoryObjectStore`], finalizer-aware, with write
//!   counters and fault injection for tests
//! - **Timeouts**: [`TimeoutStore`] bounds every call of a wrapped store
//!
//! # Example
//!
//! ```ignore
//! use seed_sync_store::{InMemoryObjectStore, ObjectStore, Resource};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryObjectStore::new();
//!     let created = store
//!         .create(Resource::new("alpha").with_spec(json!({"rule": "deny-root"})))
//!         .await
//!         .unwrap();
//!     println!("uid: {}", created.uid());
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod memory;
pub mod store;
pub mod timeout;
pub mod types;

// Re-export main types
pub use error::{Result, StoreError};
pub use memory::{InMemoryObjectStore, Operation};
pub use store::{ObjectStore, WatchRecv, WatchStream};
pub use timeout::TimeoutStore;
pub use types::{ObjectMeta, Resource, Selector, Uid, WatchEvent};
