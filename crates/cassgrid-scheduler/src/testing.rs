//! Shared fixtures for the unit tests in this crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use cassgrid_state::{
    BlobStore, ExecutorMetadata, FrameworkConfiguration, PersistedClusterJobs,
    PersistedClusterState, PersistedExecutorCounter, PersistedFrameworkConfiguration,
    PersistedHealthCheckHistory, RedbBlobStore,
};

use crate::clock::ManualClock;
use crate::cluster::CassandraCluster;
use crate::offer::{Offer, OfferResources, TaskStatus};

/// An offer that satisfies every server-task requirement of the default
/// test configuration.
pub(crate) fn adequate_offer(hostname: &str) -> Offer {
    Offer {
        id: format!("offer-{hostname}"),
        hostname: hostname.to_string(),
        resources: OfferResources {
            cpus: 8.0,
            mem_mb: 32768,
            disk_mb: 131072,
            port_ranges: vec![(1, 65535)],
        },
    }
}

pub(crate) fn base_config() -> FrameworkConfiguration {
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

/// A decision core over an in-memory backend and a manual clock.
pub(crate) struct TestCluster {
    pub cluster: CassandraCluster,
    pub clock: Arc<ManualClock>,
}

impl TestCluster {
    pub fn new(number_of_nodes: u32, number_of_seeds: u32) -> Self {
        Self::new_with(|config| {
            config.number_of_nodes = number_of_nodes;
            config.number_of_seeds = number_of_seeds;
        })
    }

    pub fn new_with(adjust: impl FnOnce(&mut FrameworkConfiguration)) -> Self {
        let backend: Arc<dyn BlobStore> = Arc::new(RedbBlobStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(1_000));
        let mut config = base_config();
        adjust(&mut config);
        let configuration =
            PersistedFrameworkConfiguration::new(backend.clone(), config).unwrap();
        let cluster = CassandraCluster::new(
            clock.clone(),
            "http://127.0.0.1:18080".to_string(),
            PersistedExecutorCounter::new(backend.clone()),
            PersistedClusterState::new(backend.clone()),
            PersistedHealthCheckHistory::new(backend.clone()),
            PersistedClusterJobs::new(backend),
            configuration,
        );
        Self { cluster, clock }
    }

    /// Offer from `hostname`, then simulate the metadata probe report.
    /// Returns the node's executor id.
    pub fn bring_up_to_metadata(&self, hostname: &str) -> String {
        let result = self
            .cluster
            .tasks_for_offer(&adequate_offer(hostname))
            .unwrap()
            .expect("metadata task expected");
        let executor_id = result.executor.executor_id.clone();
        let node = self.cluster.node_for_hostname(hostname).unwrap().unwrap();
        self.cluster
            .add_executor_metadata(ExecutorMetadata {
                executor_id: executor_id.clone(),
                ip: node.ip,
            })
            .unwrap();
        executor_id
    }

    /// Bring a node all the way to a launched server task, advancing the
    /// clock past the throttle window.
    pub fn bring_up_to_serving(&self, hostname: &str) -> String {
        let executor_id = self.bring_up_to_metadata(hostname);
        self.clock.advance(3_600_000);
        let result = self
            .cluster
            .tasks_for_offer(&adequate_offer(hostname))
            .unwrap()
            .expect("server launch expected");
        assert!(result
            .launch_tasks
            .iter()
            .any(|t| t.task_id.ends_with(".server")));
        executor_id
    }

    pub fn lost_status(&self, task_id: &str) -> TaskStatus {
        TaskStatus {
            task_id: task_id.to_string(),
            state: "TASK_LOST".to_string(),
            reason: "REASON_EXECUTOR_TERMINATED".to_string(),
            source: "SOURCE_SLAVE".to_string(),
            healthy: None,
            message: "executor terminated".to_string(),
        }
    }
}
