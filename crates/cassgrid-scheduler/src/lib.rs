//! cassgrid-scheduler — the offer-driven decision core of the cassgrid
//! framework.
//!
//! The framework operates a Cassandra cluster on top of a two-level
//! resource-offer cluster manager. This crate decides, per offer, whether
//! to launch a database node, probe an existing one, or drive a
//! cluster-wide maintenance job against it:
//!
//! ```text
//! CassandraCluster
//!   ├── Clock (injected; tests drive time manually)
//!   ├── PersistedClusterState (nodes, executor metadata, launch throttle)
//!   ├── PersistedFrameworkConfiguration
//!   ├── PersistedHealthCheckHistory
//!   ├── PersistedClusterJobs (repair/cleanup orchestration)
//!   └── PersistedExecutorCounter
//! ```
//!
//! The offer transport, the per-node executor, and the HTTP surface are
//! external collaborators; they call into the core one operation at a
//! time. Every observable mutation is persisted before a call returns.

pub mod artifacts;
pub mod clock;
pub mod cluster;
pub mod error;
pub mod jobs;
pub mod offer;
pub mod ports;
pub mod resources;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::CassandraCluster;
pub use error::{SchedulerError, SchedulerResult};
pub use offer::{Offer, OfferResources, TaskStatus, TasksForOffer};
