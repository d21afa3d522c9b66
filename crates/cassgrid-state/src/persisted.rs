//! Typed persisted stores over the blob backend.
//!
//! Each store wraps one JSON blob under a stable key (`tables`). Reads
//! decode the current blob (absence yields the store's default, a decode
//! failure is fatal `Corrupt`); writes encode and return only once the
//! backend has acknowledged. The scheduler is single-threaded, so every
//! read-modify-write here is safe without locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::BlobStore;
use crate::tables::*;
use crate::types::*;

fn read_blob<T: DeserializeOwned>(
    backend: &dyn BlobStore,
    key: &str,
    default: impl FnOnce() -> T,
) -> StateResult<T> {
    match backend.load(key)? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
            name: key.to_string(),
            detail: e.to_string(),
        }),
        None => Ok(default()),
    }
}

fn write_blob<T: Serialize>(backend: &dyn BlobStore, key: &str, value: &T) -> StateResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| StateError::Serialize(e.to_string()))?;
    backend.store(key, &bytes)
}

// ── Cluster state ──────────────────────────────────────────────────

/// Nodes, executor metadata and the launch-throttle timestamp.
#[derive(Clone)]
pub struct PersistedClusterState {
    backend: Arc<dyn BlobStore>,
}

impl PersistedClusterState {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn get(&self) -> StateResult<CassandraClusterState> {
        read_blob(&*self.backend, KEY_CLUSTER_STATE, CassandraClusterState::default)
    }

    pub fn set(&self, state: &CassandraClusterState) -> StateResult<()> {
        write_blob(&*self.backend, KEY_CLUSTER_STATE, state)
    }

    pub fn nodes(&self) -> StateResult<Vec<CassandraNode>> {
        Ok(self.get()?.nodes)
    }

    pub fn set_nodes(&self, nodes: Vec<CassandraNode>) -> StateResult<()> {
        let mut state = self.get()?;
        state.nodes = nodes;
        self.set(&state)
    }

    /// Replace the node with the same hostname, or append it.
    pub fn add_or_set_node(&self, node: CassandraNode) -> StateResult<()> {
        let mut state = self.get()?;
        match state.nodes.iter_mut().find(|n| n.hostname == node.hostname) {
            Some(existing) => *existing = node,
            None => state.nodes.push(node),
        }
        self.set(&state)
    }

    pub fn node_counts(&self) -> StateResult<NodeCounts> {
        Ok(self.get()?.node_counts())
    }

    pub fn executor_metadata(&self) -> StateResult<Vec<ExecutorMetadata>> {
        Ok(self.get()?.executor_metadata)
    }

    pub fn add_executor_metadata(&self, metadata: ExecutorMetadata) -> StateResult<()> {
        let mut state = self.get()?;
        state
            .executor_metadata
            .retain(|m| m.executor_id != metadata.executor_id);
        state.executor_metadata.push(metadata);
        self.set(&state)
    }

    pub fn remove_executor_metadata(&self, executor_id: &str) -> StateResult<()> {
        let mut state = self.get()?;
        state.executor_metadata.retain(|m| m.executor_id != executor_id);
        self.set(&state)
    }

    pub fn last_server_launch_timestamp(&self) -> StateResult<u64> {
        Ok(self.get()?.last_server_launch_timestamp)
    }

    pub fn update_last_server_launch_timestamp(&self, now_ms: u64) -> StateResult<()> {
        let mut state = self.get()?;
        state.last_server_launch_timestamp = now_ms;
        self.set(&state)
    }
}

// ── Framework configuration ────────────────────────────────────────

/// The framework configuration singleton.
///
/// Construction seeds the blob with the supplied configuration when none
/// is persisted yet, so a restart picks up prior administrative changes.
#[derive(Clone)]
pub struct PersistedFrameworkConfiguration {
    backend: Arc<dyn BlobStore>,
}

impl PersistedFrameworkConfiguration {
    pub fn new(
        backend: Arc<dyn BlobStore>,
        initial: FrameworkConfiguration,
    ) -> StateResult<Self> {
        if backend.load(KEY_FRAMEWORK_CONFIGURATION)?.is_none() {
            write_blob(&*backend, KEY_FRAMEWORK_CONFIGURATION, &initial)?;
            debug!(framework = %initial.framework_name, "framework configuration seeded");
        }
        Ok(Self { backend })
    }

    pub fn get(&self) -> StateResult<FrameworkConfiguration> {
        match self.backend.load(KEY_FRAMEWORK_CONFIGURATION)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StateError::Corrupt {
                    name: KEY_FRAMEWORK_CONFIGURATION.to_string(),
                    detail: e.to_string(),
                })
            }
            None => Err(StateError::Corrupt {
                name: KEY_FRAMEWORK_CONFIGURATION.to_string(),
                detail: "configuration blob missing".to_string(),
            }),
        }
    }

    pub fn set(&self, config: &FrameworkConfiguration) -> StateResult<()> {
        write_blob(&*self.backend, KEY_FRAMEWORK_CONFIGURATION, config)
    }

    /// Administrative change of the target node count.
    ///
    /// Rejects values below the seed count or below one; on rejection the
    /// previous configuration is retained.
    pub fn set_number_of_nodes(&self, number_of_nodes: u32) -> StateResult<()> {
        let mut config = self.get()?;
        if number_of_nodes < 1 {
            return Err(StateError::InvalidConfiguration(format!(
                "number of nodes must be at least 1, got {number_of_nodes}"
            )));
        }
        if number_of_nodes < config.number_of_seeds {
            return Err(StateError::InvalidConfiguration(format!(
                "number of nodes {} must not be less than number of seeds {}",
                number_of_nodes, config.number_of_seeds
            )));
        }
        config.number_of_nodes = number_of_nodes;
        self.set(&config)?;
        info!(number_of_nodes, "node count updated");
        Ok(())
    }
}

// ── Health-check history ───────────────────────────────────────────

/// Append-only health-check history.
#[derive(Clone)]
pub struct PersistedHealthCheckHistory {
    backend: Arc<dyn BlobStore>,
}

impl PersistedHealthCheckHistory {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn get(&self) -> StateResult<HealthCheckHistory> {
        read_blob(
            &*self.backend,
            KEY_HEALTH_CHECK_HISTORY,
            HealthCheckHistory::default,
        )
    }

    pub fn record(&self, entry: HealthCheckHistoryEntry) -> StateResult<()> {
        let mut history = self.get()?;
        history.entries.push(entry);
        write_blob(&*self.backend, KEY_HEALTH_CHECK_HISTORY, &history)
    }

    /// Most recent entry for one executor.
    pub fn last(&self, executor_id: &str) -> StateResult<Option<HealthCheckHistoryEntry>> {
        let history = self.get()?;
        let mut last: Option<HealthCheckHistoryEntry> = None;
        for entry in history.entries {
            if entry.executor_id != executor_id {
                continue;
            }
            if last.as_ref().map_or(true, |l| entry.timestamp_ms >= l.timestamp_ms) {
                last = Some(entry);
            }
        }
        Ok(last)
    }

    /// Most recent entry per executor, over all entries.
    pub fn last_per_executor(&self) -> StateResult<Vec<HealthCheckHistoryEntry>> {
        let history = self.get()?;
        let mut latest: BTreeMap<String, HealthCheckHistoryEntry> = BTreeMap::new();
        for entry in history.entries {
            match latest.get(&entry.executor_id) {
                Some(existing) if entry.timestamp_ms < existing.timestamp_ms => {}
                _ => {
                    latest.insert(entry.executor_id.clone(), entry);
                }
            }
        }
        Ok(latest.into_values().collect())
    }
}

// ── Cluster jobs ───────────────────────────────────────────────────

/// Current and last cluster jobs, with the job-progress mutations.
#[derive(Clone)]
pub struct PersistedClusterJobs {
    backend: Arc<dyn BlobStore>,
}

impl PersistedClusterJobs {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn get(&self) -> StateResult<CassandraClusterJobs> {
        read_blob(&*self.backend, KEY_CLUSTER_JOBS, CassandraClusterJobs::default)
    }

    fn set(&self, jobs: &CassandraClusterJobs) -> StateResult<()> {
        write_blob(&*self.backend, KEY_CLUSTER_JOBS, jobs)
    }

    pub fn current_job(&self) -> StateResult<Option<ClusterJobStatus>> {
        Ok(self.get()?.current_cluster_job)
    }

    pub fn set_current_job(&self, job: Option<ClusterJobStatus>) -> StateResult<()> {
        let mut jobs = self.get()?;
        jobs.current_cluster_job = job;
        self.set(&jobs)
    }

    /// Most recent finished job of the given type, if any.
    pub fn last_job(&self, job_type: ClusterJobType) -> StateResult<Option<ClusterJobStatus>> {
        Ok(self
            .get()?
            .last_cluster_jobs
            .into_iter()
            .find(|j| j.job_type == job_type))
    }

    /// Apply a node-job status report to the current job.
    ///
    /// Only a report matching the current node is applied: `running`
    /// replaces the current node's status in place, a terminal report
    /// moves it to the completed list. When the last node completes the
    /// job is stamped finished and archived.
    pub fn update_node_status(&self, status: NodeJobStatus, now_ms: u64) -> StateResult<()> {
        let Some(mut job) = self.current_job()? else {
            return Ok(());
        };
        let Some(current) = job.current_node.as_ref() else {
            return Ok(());
        };
        if current.executor_id != status.executor_id {
            return Ok(());
        }

        if status.running {
            job.current_node = Some(status);
            self.set_current_job(Some(job))
        } else {
            job.current_node = None;
            job.completed_nodes.push(status);
            if job.remaining_nodes.is_empty() {
                job.finished_timestamp_ms = Some(now_ms);
                self.finish_job(job)
            } else {
                self.set_current_job(Some(job))
            }
        }
    }

    /// Fail the current node (its task was lost) and move it to the
    /// completed list.
    pub fn fail_current_node(&self, failure_message: String) -> StateResult<()> {
        let Some(mut job) = self.current_job()? else {
            return Ok(());
        };
        let Some(mut current) = job.current_node.take() else {
            return Ok(());
        };

        current.running = false;
        current.failed = true;
        current.failure_message = Some(failure_message);
        job.completed_nodes.push(current);
        self.set_current_job(Some(job))
    }

    /// Consume `current.executor_id` from the remaining list and make it
    /// the current node.
    pub fn next_node(&self, mut job: ClusterJobStatus, current: NodeJobStatus) -> StateResult<()> {
        job.remaining_nodes.retain(|id| *id != current.executor_id);
        job.current_node = Some(current);
        self.set_current_job(Some(job))
    }

    /// Archive a completed job, displacing any prior entry of the same
    /// type, and clear the current job.
    pub fn finish_job(&self, job: ClusterJobStatus) -> StateResult<()> {
        let mut jobs = self.get()?;
        jobs.last_cluster_jobs.retain(|j| j.job_type != job.job_type);
        jobs.last_cluster_jobs.insert(0, job);
        jobs.current_cluster_job = None;
        self.set(&jobs)
    }
}

// ── Executor counter ───────────────────────────────────────────────

/// Monotonic counter minting fresh executor ids.
#[derive(Clone)]
pub struct PersistedExecutorCounter {
    backend: Arc<dyn BlobStore>,
}

impl PersistedExecutorCounter {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self { backend }
    }

    pub fn get(&self) -> StateResult<u64> {
        read_blob(&*self.backend, KEY_EXECUTOR_COUNTER, || 0u64)
    }

    /// Return the current value and persist the increment.
    pub fn get_and_increment(&self) -> StateResult<u64> {
        let value = self.get()?;
        write_blob(&*self.backend, KEY_EXECUTOR_COUNTER, &(value + 1))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RedbBlobStore;

    fn backend() -> Arc<dyn BlobStore> {
        Arc::new(RedbBlobStore::open_in_memory().unwrap())
    }

    fn test_config() -> FrameworkConfiguration {
        FrameworkConfiguration {
            framework_name: "cassgrid".to_string(),
            cassandra_version: "2.1.2".to_string(),
            number_of_nodes: 3,
            number_of_seeds: 2,
            cpu_cores: 2.0,
            mem_mb: 8192,
            disk_mb: 16384,
            health_check_interval_seconds: 60,
            bootstrap_grace_time_seconds: 120,
            port_mappings: BTreeMap::new(),
        }
    }

    fn test_node(hostname: &str, seed: bool) -> CassandraNode {
        CassandraNode {
            hostname: hostname.to_string(),
            ip: format!("10.0.0.{}", hostname.len()),
            seed,
            jmx_connect: JmxConnect {
                ip: "127.0.0.1".to_string(),
                jmx_port: 7199,
            },
            executor: None,
            metadata_task: None,
            server_task: None,
        }
    }

    fn health_entry(executor_id: &str, timestamp_ms: u64, healthy: bool) -> HealthCheckHistoryEntry {
        HealthCheckHistoryEntry {
            executor_id: executor_id.to_string(),
            timestamp_ms,
            details: HealthCheckDetails {
                healthy,
                msg: String::new(),
                info: None,
            },
        }
    }

    fn test_job(job_type: ClusterJobType, remaining: &[&str]) -> ClusterJobStatus {
        ClusterJobStatus {
            job_type,
            started_timestamp_ms: 1000,
            finished_timestamp_ms: None,
            aborted: false,
            remaining_nodes: remaining.iter().map(|s| s.to_string()).collect(),
            current_node: None,
            completed_nodes: Vec::new(),
        }
    }

    fn node_status(executor_id: &str, running: bool) -> NodeJobStatus {
        NodeJobStatus {
            executor_id: executor_id.to_string(),
            task_id: format!("{executor_id}.repair"),
            job_type: ClusterJobType::Repair,
            started_timestamp_ms: 1000,
            running,
            failed: false,
            failure_message: None,
        }
    }

    // ── Cluster state ──────────────────────────────────────────────

    #[test]
    fn cluster_state_defaults_when_absent() {
        let state = PersistedClusterState::new(backend());
        let value = state.get().unwrap();
        assert!(value.nodes.is_empty());
        assert_eq!(value.last_server_launch_timestamp, 0);
    }

    #[test]
    fn add_or_set_node_appends_then_replaces() {
        let state = PersistedClusterState::new(backend());

        state.add_or_set_node(test_node("h1", true)).unwrap();
        state.add_or_set_node(test_node("h2", false)).unwrap();
        assert_eq!(state.nodes().unwrap().len(), 2);

        let mut updated = test_node("h1", true);
        updated.ip = "10.9.9.9".to_string();
        state.add_or_set_node(updated).unwrap();

        let nodes = state.nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].ip, "10.9.9.9");
        // Registration order preserved.
        assert_eq!(nodes[1].hostname, "h2");
    }

    #[test]
    fn executor_metadata_add_and_remove() {
        let state = PersistedClusterState::new(backend());

        state
            .add_executor_metadata(ExecutorMetadata {
                executor_id: "e1".to_string(),
                ip: "10.0.0.1".to_string(),
            })
            .unwrap();
        state
            .add_executor_metadata(ExecutorMetadata {
                executor_id: "e2".to_string(),
                ip: "10.0.0.2".to_string(),
            })
            .unwrap();
        assert_eq!(state.executor_metadata().unwrap().len(), 2);

        state.remove_executor_metadata("e1").unwrap();
        let remaining = state.executor_metadata().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].executor_id, "e2");
    }

    #[test]
    fn corrupt_blob_is_fatal() {
        let raw = backend();
        raw.store(KEY_CLUSTER_STATE, b"not json").unwrap();
        let state = PersistedClusterState::new(raw);
        assert!(matches!(state.get(), Err(StateError::Corrupt { .. })));
    }

    // ── Configuration ──────────────────────────────────────────────

    #[test]
    fn configuration_seeded_once() {
        let raw = backend();
        let config = PersistedFrameworkConfiguration::new(raw.clone(), test_config()).unwrap();
        config.set_number_of_nodes(5).unwrap();

        // Reconstructing with a different initial must not clobber it.
        let mut other = test_config();
        other.number_of_nodes = 99;
        let config = PersistedFrameworkConfiguration::new(raw, other).unwrap();
        assert_eq!(config.get().unwrap().number_of_nodes, 5);
    }

    #[test]
    fn node_count_below_seeds_is_rejected_and_retained() {
        let config =
            PersistedFrameworkConfiguration::new(backend(), test_config()).unwrap();

        let result = config.set_number_of_nodes(1); // seeds = 2
        assert!(matches!(result, Err(StateError::InvalidConfiguration(_))));
        assert_eq!(config.get().unwrap().number_of_nodes, 3);
    }

    // ── Health history ─────────────────────────────────────────────

    #[test]
    fn last_returns_most_recent_entry_for_executor() {
        let history = PersistedHealthCheckHistory::new(backend());
        history.record(health_entry("e1", 100, false)).unwrap();
        history.record(health_entry("e2", 150, true)).unwrap();
        history.record(health_entry("e1", 200, true)).unwrap();

        let last = history.last("e1").unwrap().unwrap();
        assert_eq!(last.timestamp_ms, 200);
        assert!(last.details.healthy);
        assert!(history.last("e3").unwrap().is_none());
    }

    #[test]
    fn last_per_executor_spans_all_entries() {
        let history = PersistedHealthCheckHistory::new(backend());
        history.record(health_entry("e1", 100, true)).unwrap();
        history.record(health_entry("e2", 110, false)).unwrap();
        history.record(health_entry("e1", 120, false)).unwrap();

        let latest = history.last_per_executor().unwrap();
        assert_eq!(latest.len(), 2);
        let e1 = latest.iter().find(|e| e.executor_id == "e1").unwrap();
        assert_eq!(e1.timestamp_ms, 120);
        assert!(!e1.details.healthy);
    }

    // ── Cluster jobs ───────────────────────────────────────────────

    #[test]
    fn running_status_replaces_current_node() {
        let jobs = PersistedClusterJobs::new(backend());
        let mut job = test_job(ClusterJobType::Repair, &["e2"]);
        job.current_node = Some(node_status("e1", true));
        jobs.set_current_job(Some(job)).unwrap();

        let mut update = node_status("e1", true);
        update.started_timestamp_ms = 4242;
        jobs.update_node_status(update, 5000).unwrap();

        let current = jobs.current_job().unwrap().unwrap();
        assert_eq!(
            current.current_node.as_ref().unwrap().started_timestamp_ms,
            4242
        );
    }

    #[test]
    fn terminal_status_moves_node_to_completed() {
        let jobs = PersistedClusterJobs::new(backend());
        let mut job = test_job(ClusterJobType::Repair, &["e2"]);
        job.current_node = Some(node_status("e1", true));
        jobs.set_current_job(Some(job)).unwrap();

        jobs.update_node_status(node_status("e1", false), 5000).unwrap();

        let current = jobs.current_job().unwrap().unwrap();
        assert!(current.current_node.is_none());
        assert_eq!(current.completed_nodes.len(), 1);
        assert!(current.finished_timestamp_ms.is_none());
    }

    #[test]
    fn last_terminal_status_finishes_and_archives_job() {
        let jobs = PersistedClusterJobs::new(backend());

        // A prior repair job sits in the archive.
        let mut prior = test_job(ClusterJobType::Repair, &[]);
        prior.finished_timestamp_ms = Some(900);
        jobs.finish_job(prior).unwrap();

        let mut job = test_job(ClusterJobType::Repair, &[]);
        job.current_node = Some(node_status("e1", true));
        jobs.set_current_job(Some(job)).unwrap();

        jobs.update_node_status(node_status("e1", false), 7777).unwrap();

        assert!(jobs.current_job().unwrap().is_none());
        let archived = jobs.last_job(ClusterJobType::Repair).unwrap().unwrap();
        assert_eq!(archived.finished_timestamp_ms, Some(7777));
        // Prior entry displaced.
        assert_eq!(jobs.get().unwrap().last_cluster_jobs.len(), 1);
    }

    #[test]
    fn status_for_other_executor_is_ignored() {
        let jobs = PersistedClusterJobs::new(backend());
        let mut job = test_job(ClusterJobType::Repair, &["e2"]);
        job.current_node = Some(node_status("e1", true));
        jobs.set_current_job(Some(job.clone())).unwrap();

        jobs.update_node_status(node_status("e2", false), 5000).unwrap();

        assert_eq!(jobs.current_job().unwrap(), Some(job));
    }

    #[test]
    fn fail_current_node_records_failure() {
        let jobs = PersistedClusterJobs::new(backend());
        let mut job = test_job(ClusterJobType::Repair, &["e2"]);
        job.current_node = Some(node_status("e1", true));
        jobs.set_current_job(Some(job)).unwrap();

        jobs.fail_current_node("TaskStatus:TASK_LOST".to_string()).unwrap();

        let current = jobs.current_job().unwrap().unwrap();
        assert!(current.current_node.is_none());
        let completed = &current.completed_nodes[0];
        assert!(completed.failed);
        assert!(!completed.running);
        assert_eq!(
            completed.failure_message.as_deref(),
            Some("TaskStatus:TASK_LOST")
        );
    }

    // ── Executor counter ───────────────────────────────────────────

    #[test]
    fn counter_is_monotonic_and_durable() {
        let raw = backend();
        let counter = PersistedExecutorCounter::new(raw.clone());
        assert_eq!(counter.get_and_increment().unwrap(), 0);
        assert_eq!(counter.get_and_increment().unwrap(), 1);

        // A fresh handle over the same backend continues the sequence.
        let counter = PersistedExecutorCounter::new(raw);
        assert_eq!(counter.get_and_increment().unwrap(), 2);
    }
}
