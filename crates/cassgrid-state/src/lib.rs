//! cassgrid-state — persisted state for the cassgrid framework.
//!
//! Backed by [redb](https://docs.rs/redb), provides durable storage for
//! the five framework blobs: cluster state, framework configuration,
//! health-check history, cluster jobs, and the executor-id counter.
//!
//! # Architecture
//!
//! Every logical store wraps a single JSON blob under a stable key in one
//! redb table (`tables`). The `BlobStore` trait is the seam to the
//! backend: durable `store`, `load` with read-your-writes. Typed stores
//! in `persisted` layer the domain accessors and mutations on top; the
//! scheduler serializes all calls, so read-modify-write needs no locking.

pub mod error;
pub mod persisted;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use persisted::{
    PersistedClusterJobs, PersistedClusterState, PersistedExecutorCounter,
    PersistedFrameworkConfiguration, PersistedHealthCheckHistory,
};
pub use store::{BlobStore, RedbBlobStore};
pub use types::*;
