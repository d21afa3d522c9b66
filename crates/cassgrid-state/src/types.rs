//! Domain types for the cassgrid state layer.
//!
//! These types represent everything the scheduler persists: the framework
//! configuration, the cluster state (nodes, executor metadata, launch
//! throttle timestamp), the health-check history, and cluster-wide
//! maintenance jobs. All types are serializable to/from JSON for storage
//! in the blob store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a long-lived executor process on a host.
pub type ExecutorId = String;

// ── Framework configuration ────────────────────────────────────────

/// Administrative configuration of the framework (persistent singleton).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameworkConfiguration {
    pub framework_name: String,
    /// Version of the Cassandra distribution to deploy.
    pub cassandra_version: String,
    /// Target number of database nodes (≥ 1).
    pub number_of_nodes: u32,
    /// Number of seed nodes (≥ 1, ≤ `number_of_nodes`).
    pub number_of_seeds: u32,
    /// CPU cores reserved per server task.
    pub cpu_cores: f64,
    /// Memory in MiB reserved per server task.
    pub mem_mb: u64,
    /// Disk in MiB reserved per server task.
    pub disk_mb: u64,
    /// Interval between health checks; ≤ 0 disables periodic checks.
    pub health_check_interval_seconds: i64,
    /// Minimum quiet time after a server launch before the next one.
    pub bootstrap_grace_time_seconds: i64,
    /// Sparse overrides of symbolic port name → numeric port.
    #[serde(default)]
    pub port_mappings: BTreeMap<String, u16>,
}

// ── Cluster state ──────────────────────────────────────────────────

/// The persisted cluster state (nodes in registration order).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CassandraClusterState {
    pub nodes: Vec<CassandraNode>,
    /// One record per executor whose metadata probe has reported.
    pub executor_metadata: Vec<ExecutorMetadata>,
    /// Millisecond instant of the most recent server-task launch.
    pub last_server_launch_timestamp: u64,
}

/// Registered/seed counts derived from the node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCounts {
    pub node_count: u32,
    pub seed_count: u32,
}

/// A single database node, keyed by hostname.
///
/// The optional fields fill in monotonically as the node advances through
/// bring-up: executor → metadata task → server task. Task removal clears
/// the corresponding field again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CassandraNode {
    pub hostname: String,
    /// Resolved once at registration.
    pub ip: String,
    /// Fixed at registration; the first `number_of_seeds` nodes are seeds.
    pub seed: bool,
    pub jmx_connect: JmxConnect,
    pub executor: Option<NodeExecutor>,
    pub metadata_task: Option<NodeTask>,
    pub server_task: Option<NodeTask>,
}

/// JMX management endpoint of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JmxConnect {
    pub ip: String,
    pub jmx_port: u16,
}

/// Descriptor of the per-node executor process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeExecutor {
    pub executor_id: ExecutorId,
    /// Framework name, for attribution in the cluster manager UI.
    pub source: String,
    pub cpu_cores: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
    /// The command that starts the executor (the bundled JRE's `java`).
    pub command: String,
    pub arguments: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Artifacts fetched before the executor starts.
    pub download_resources: Vec<ResourceUri>,
}

/// A launch artifact: JRE archive, database distribution, executor bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceUri {
    pub url: String,
    /// Whether the fetcher should unpack the archive.
    pub extract: bool,
}

/// A task launched on an executor, described by resources plus a typed
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeTask {
    pub task_id: String,
    pub executor_id: ExecutorId,
    pub cpu_cores: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
    pub ports: Vec<u16>,
    pub details: TaskDetails,
}

/// Typed task payloads delivered to executors.
///
/// `ExecutorMetadata`, `CassandraServerRun` and `NodeJob` are launched as
/// tasks; `HealthCheck` and `NodeJobStatus` are submitted to an already
/// running executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDetails {
    ExecutorMetadata {
        executor_id: ExecutorId,
        ip: String,
    },
    CassandraServerRun {
        command: Vec<String>,
        config: CassandraServerConfig,
        version: String,
        env: BTreeMap<String, String>,
        jmx: JmxConnect,
    },
    HealthCheck,
    NodeJob {
        job_type: ClusterJobType,
    },
    NodeJobStatus,
}

/// Ordered `cassandra.yaml` overrides handed to the server task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CassandraServerConfig {
    pub variables: Vec<ConfigVariable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigVariable {
    pub name: String,
    pub value: String,
}

/// The IP an executor reported after its metadata probe completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorMetadata {
    pub executor_id: ExecutorId,
    pub ip: String,
}

// ── Health-check history ───────────────────────────────────────────

/// Append-only health-check history across all executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckHistory {
    pub entries: Vec<HealthCheckHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckHistoryEntry {
    pub executor_id: ExecutorId,
    pub timestamp_ms: u64,
    pub details: HealthCheckDetails,
}

/// Outcome of one health check against a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckDetails {
    pub healthy: bool,
    #[serde(default)]
    pub msg: String,
    /// Database-reported node info; absent when the probe failed outright.
    pub info: Option<NodeInfo>,
}

/// Node status as reported by the database process itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInfo {
    pub cluster_name: String,
    /// Whether the node has joined the ring.
    pub joined: bool,
    /// "NORMAL" in steady state; anything else is transitional.
    pub operation_mode: String,
    pub endpoint: String,
}

// ── Cluster jobs ───────────────────────────────────────────────────

/// Kinds of cluster-wide maintenance jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterJobType {
    Repair,
    Cleanup,
}

impl ClusterJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterJobType::Repair => "repair",
            ClusterJobType::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for ClusterJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster-job bookkeeping (persistent singleton).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CassandraClusterJobs {
    pub current_cluster_job: Option<ClusterJobStatus>,
    /// Most recent finished job per type, newest displacing.
    pub last_cluster_jobs: Vec<ClusterJobStatus>,
}

/// A cluster-wide job visiting every node once, one at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterJobStatus {
    pub job_type: ClusterJobType,
    pub started_timestamp_ms: u64,
    pub finished_timestamp_ms: Option<u64>,
    pub aborted: bool,
    /// Executor ids yet to be visited, in node registration order.
    pub remaining_nodes: Vec<ExecutorId>,
    pub current_node: Option<NodeJobStatus>,
    pub completed_nodes: Vec<NodeJobStatus>,
}

/// Per-node progress of a cluster job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeJobStatus {
    pub executor_id: ExecutorId,
    pub task_id: String,
    pub job_type: ClusterJobType,
    pub started_timestamp_ms: u64,
    pub running: bool,
    pub failed: bool,
    pub failure_message: Option<String>,
}

impl CassandraClusterState {
    /// Count registered and seed nodes.
    pub fn node_counts(&self) -> NodeCounts {
        NodeCounts {
            node_count: self.nodes.len() as u32,
            seed_count: self.nodes.iter().filter(|n| n.seed).count() as u32,
        }
    }

    /// IPs of all seed nodes, in registration order.
    pub fn seed_node_ips(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.seed)
            .map(|n| n.ip.clone())
            .collect()
    }
}
