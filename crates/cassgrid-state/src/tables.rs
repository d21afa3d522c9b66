//! redb table definition and stable blob key names.
//!
//! The state layer stores one JSON blob per logical store in a single
//! redb table keyed by the names below. The key names are part of the
//! on-disk contract and must never change.

use redb::TableDefinition;

/// All framework blobs live in this table, keyed by blob name.
pub const FRAMEWORK_STATE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("framework_state");

/// Cluster state: nodes, executor metadata, launch throttle timestamp.
pub const KEY_CLUSTER_STATE: &str = "CassandraClusterState";

/// Append-only health-check history.
pub const KEY_HEALTH_CHECK_HISTORY: &str = "CassandraClusterHealthCheckHistory";

/// Framework configuration singleton.
pub const KEY_FRAMEWORK_CONFIGURATION: &str = "CassandraFrameworkConfiguration";

/// Current and last cluster jobs.
pub const KEY_CLUSTER_JOBS: &str = "CassandraClusterJobs";

/// Monotonic counter minting executor ids.
pub const KEY_EXECUTOR_COUNTER: &str = "ExecutorCounter";
