//! The scheduler decision core.
//!
//! `CassandraCluster` advances every node through its bring-up state
//! machine (register → executor → metadata probe → server → health
//! checks) one resource offer at a time, enforcing the cluster-wide
//! admission gates before a server task may launch. The offer transport
//! invokes the core one call at a time; all mutations flow through the
//! persisted stores before a call returns, so the scheduler is
//! crash-safe.
//!
//! Periodic work (health checks, job steps) is purely offer-driven:
//! every time-based decision compares the injected clock against a
//! persisted timestamp. There is no timer thread.

use std::collections::BTreeMap;
use std::net::{IpAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;

use tracing::{debug, info};

use cassgrid_state::{
    CassandraNode, CassandraServerConfig, ConfigVariable, ExecutorMetadata,
    FrameworkConfiguration, HealthCheckDetails, HealthCheckHistoryEntry, JmxConnect,
    NodeExecutor, NodeTask, PersistedClusterJobs, PersistedClusterState,
    PersistedExecutorCounter, PersistedFrameworkConfiguration, PersistedHealthCheckHistory,
    StateError, TaskDetails,
};

use crate::artifacts::{java_exec, os_name, url_for_resource};
use crate::clock::Clock;
use crate::error::{SchedulerError, SchedulerResult};
use crate::offer::{Offer, TaskStatus, TasksForOffer};
use crate::ports::{self, PORT_JMX, PORT_NATIVE, PORT_RPC, PORT_STORAGE, PORT_STORAGE_SSL};
use crate::resources::check_resources;

/// Steady-state operation mode reported by a fully joined node.
pub const OPERATION_MODE_NORMAL: &str = "NORMAL";

const EXECUTOR_CPU_CORES: f64 = 0.1;
const EXECUTOR_MEM_MB: u64 = 16;
const EXECUTOR_DISK_MB: u64 = 16;

/// The decision core. One instance per framework, driven by the offer
/// transport and the task-status stream.
pub struct CassandraCluster {
    clock: Arc<dyn Clock>,
    http_server_base_url: String,
    exec_counter: PersistedExecutorCounter,
    cluster_state: PersistedClusterState,
    health_check_history: PersistedHealthCheckHistory,
    jobs_state: PersistedClusterJobs,
    configuration: PersistedFrameworkConfiguration,
}

impl CassandraCluster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Arc<dyn Clock>,
        http_server_base_url: String,
        exec_counter: PersistedExecutorCounter,
        cluster_state: PersistedClusterState,
        health_check_history: PersistedHealthCheckHistory,
        jobs_state: PersistedClusterJobs,
        configuration: PersistedFrameworkConfiguration,
    ) -> Self {
        Self {
            clock,
            http_server_base_url,
            exec_counter,
            cluster_state,
            health_check_history,
            jobs_state,
            configuration,
        }
    }

    pub fn cluster_state(&self) -> &PersistedClusterState {
        &self.cluster_state
    }

    pub fn configuration(&self) -> &PersistedFrameworkConfiguration {
        &self.configuration
    }

    pub fn jobs_state(&self) -> &PersistedClusterJobs {
        &self.jobs_state
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    // ── Offer decision ─────────────────────────────────────────────

    /// Decide what a single offer yields: task launches, submissions to
    /// the running executor, or nothing (`None`).
    pub fn tasks_for_offer(&self, offer: &Offer) -> SchedulerResult<Option<TasksForOffer>> {
        debug!(offer_id = %offer.id, hostname = %offer.hostname, "evaluating offer");
        let config = self.configuration.get()?;

        let mut node = match self.node_for_hostname(&offer.hostname)? {
            Some(node) => node,
            None => {
                let counts = self.cluster_state.node_counts()?;
                if counts.node_count >= config.number_of_nodes {
                    // Cluster already at target size.
                    return Ok(None);
                }
                let seed = counts.seed_count < config.number_of_seeds;
                self.register_node(offer, &config, seed)?
            }
        };

        let executor = match node.executor.clone() {
            Some(executor) => executor,
            None => {
                let executor_id = self.executor_id_for_offer(offer, &config)?;
                let executor = self.build_executor(executor_id, &config);
                node.executor = Some(executor.clone());
                executor
            }
        };
        let executor_id = executor.executor_id.clone();
        let mut result = TasksForOffer::new(executor);

        if node.metadata_task.is_none() {
            let task = metadata_task(&executor_id, &node.ip);
            node.metadata_task = Some(task.clone());
            result.launch_tasks.push(task);
        } else if let Some(metadata) = self.executor_metadata(&executor_id)? {
            if node.server_task.is_none() {
                if !self.admit_server_launch(offer, &node, &config)? {
                    return Ok(None);
                }
                let shortfalls = check_resources(
                    offer,
                    config.cpu_cores,
                    config.mem_mb,
                    config.disk_mb,
                    &ports::all_ports(&config),
                );
                if !shortfalls.is_empty() {
                    info!(
                        offer_id = %offer.id,
                        shortfalls = ?shortfalls,
                        "insufficient resources in offer"
                    );
                } else {
                    let task = self.server_task(&executor_id, &metadata, &node, &config)?;
                    node.server_task = Some(task.clone());
                    result.launch_tasks.push(task);
                    self.cluster_state
                        .update_last_server_launch_timestamp(self.clock.now_ms())?;
                }
            } else {
                if self.should_run_health_check(&executor_id, &config)? {
                    result.submit_tasks.push(TaskDetails::HealthCheck);
                }
                self.handle_cluster_job(&executor_id, &mut result)?;
            }
        }

        if !result.has_any_task() {
            // Nothing to do for this offer.
            return Ok(None);
        }

        self.cluster_state.add_or_set_node(node)?;
        Ok(Some(result))
    }

    // ── Cluster-level admission ────────────────────────────────────

    /// The three gates that must pass before a server task may launch.
    fn admit_server_launch(
        &self,
        offer: &Offer,
        node: &CassandraNode,
        config: &FrameworkConfiguration,
    ) -> SchedulerResult<bool> {
        // Seed-first: while metadata records are short of the seed
        // requirement, only seed nodes may proceed.
        if !node.seed {
            let metadata_count = self.cluster_state.executor_metadata()?.len() as u32;
            if metadata_count < config.number_of_seeds {
                debug!(
                    offer_id = %offer.id,
                    "cannot launch non-seed node (seed node requirement not fulfilled)"
                );
                return Ok(false);
            }
        }

        if !self.can_launch_server_task()? {
            debug!(offer_id = %offer.id, "cannot launch server (throttled)");
            return Ok(false);
        }

        if !node.seed && !self.topology_quiescent_for_non_seed()? {
            return Ok(false);
        }

        Ok(true)
    }

    fn can_launch_server_task(&self) -> SchedulerResult<bool> {
        Ok(self.clock.now_ms() > self.next_possible_server_launch_timestamp()?)
    }

    /// Earliest instant the next server task may launch.
    pub fn next_possible_server_launch_timestamp(&self) -> SchedulerResult<u64> {
        let last = self.cluster_state.last_server_launch_timestamp()?;
        let config = self.configuration.get()?;
        let seconds = config
            .bootstrap_grace_time_seconds
            .max(config.health_check_interval_seconds)
            .max(0) as u64;
        Ok(last + seconds * 1000)
    }

    /// A non-seed may only start while the ring is stable: at least one
    /// seed serving in NORMAL, and no node in a transitional state.
    fn topology_quiescent_for_non_seed(&self) -> SchedulerResult<bool> {
        let mut any_seed_normal = false;
        let mut any_node_influencing_topology = false;

        for node in self.cluster_state.nodes()? {
            if node.server_task.is_none() {
                continue;
            }
            let Some(executor) = &node.executor else {
                continue;
            };
            let Some(last) = self.health_check_history.last(&executor.executor_id)? else {
                continue;
            };
            if !last.details.healthy {
                continue;
            }
            let Some(info) = &last.details.info else {
                continue;
            };
            let steady = info.joined && info.operation_mode == OPERATION_MODE_NORMAL;
            if node.seed && steady {
                any_seed_normal = true;
            }
            if !steady {
                debug!(
                    hostname = %node.hostname,
                    operation_mode = %info.operation_mode,
                    "cannot start server task while node influences topology"
                );
                any_node_influencing_topology = true;
            }
        }

        if !any_seed_normal {
            debug!("cannot start server task because no seed node is running");
            return Ok(false);
        }
        Ok(!any_node_influencing_topology)
    }

    // ── Node registration ──────────────────────────────────────────

    fn register_node(
        &self,
        offer: &Offer,
        config: &FrameworkConfiguration,
        seed: bool,
    ) -> SchedulerResult<CassandraNode> {
        let ip = resolve_hostname(&offer.hostname)?;
        let jmx_port = if ip.is_loopback() {
            free_jmx_port()?
        } else {
            ports::port_for(config, PORT_JMX)?
        };

        let node = CassandraNode {
            hostname: offer.hostname.clone(),
            ip: ip.to_string(),
            seed,
            jmx_connect: JmxConnect {
                ip: "127.0.0.1".to_string(),
                jmx_port,
            },
            executor: None,
            metadata_task: None,
            server_task: None,
        };

        let mut state = self.cluster_state.get()?;
        state.nodes.push(node.clone());
        self.cluster_state.set(&state)?;
        info!(hostname = %node.hostname, ip = %node.ip, seed, "node registered");
        Ok(node)
    }

    /// Reuse the executor id of any node on the same hostname, otherwise
    /// mint a fresh one from the counter.
    fn executor_id_for_offer(
        &self,
        offer: &Offer,
        config: &FrameworkConfiguration,
    ) -> SchedulerResult<String> {
        for node in self.cluster_state.nodes()? {
            if node.hostname != offer.hostname {
                continue;
            }
            if let Some(executor) = node.executor {
                return Ok(executor.executor_id);
            }
        }
        let n = self.exec_counter.get_and_increment()?;
        Ok(format!("{}.node.{}.executor", config.framework_name, n))
    }

    fn build_executor(&self, executor_id: String, config: &FrameworkConfiguration) -> NodeExecutor {
        let os = os_name();
        NodeExecutor {
            executor_id,
            source: config.framework_name.clone(),
            cpu_cores: EXECUTOR_CPU_CORES,
            mem_mb: EXECUTOR_MEM_MB,
            disk_mb: EXECUTOR_DISK_MB,
            command: java_exec(&os).to_string(),
            arguments: vec![
                "-XX:+PrintCommandLineFlags".to_string(),
                "$JAVA_OPTS".to_string(),
                "-classpath".to_string(),
                "cassandra-executor.jar".to_string(),
                "io.cassgrid.executor.CassandraExecutor".to_string(),
            ],
            env: BTreeMap::from([(
                "JAVA_OPTS".to_string(),
                "-Xms256m -Xmx256m".to_string(),
            )]),
            download_resources: vec![
                cassgrid_state::ResourceUri {
                    url: url_for_resource(
                        &self.http_server_base_url,
                        &format!("/jre-7-{os}.tar.gz"),
                    ),
                    extract: true,
                },
                cassgrid_state::ResourceUri {
                    url: url_for_resource(
                        &self.http_server_base_url,
                        &format!("/apache-cassandra-{}-bin.tar.gz", config.cassandra_version),
                    ),
                    extract: true,
                },
                cassgrid_state::ResourceUri {
                    url: url_for_resource(&self.http_server_base_url, "/cassandra-executor.jar"),
                    extract: false,
                },
            ],
        }
    }

    // ── Server task ────────────────────────────────────────────────

    fn server_task(
        &self,
        executor_id: &str,
        metadata: &ExecutorMetadata,
        node: &CassandraNode,
        config: &FrameworkConfiguration,
    ) -> SchedulerResult<NodeTask> {
        let mut variables = vec![
            config_variable("cluster_name", &config.framework_name),
            config_variable("broadcast_address", &metadata.ip),
            config_variable("rpc_address", &metadata.ip),
            config_variable("listen_address", &metadata.ip),
        ];
        for name in [PORT_STORAGE, PORT_STORAGE_SSL, PORT_NATIVE, PORT_RPC] {
            variables.push(config_variable(
                name,
                &ports::port_for(config, name)?.to_string(),
            ));
        }
        variables.push(config_variable(
            "seeds",
            &self.cluster_state.get()?.seed_node_ips().join(","),
        ));

        // See conf/cassandra-env.sh in the distribution for these
        // variables; HEAP_NEWSIZE follows the 100 MB per core guidance.
        let env = BTreeMap::from([
            (
                "JMX_PORT".to_string(),
                node.jmx_connect.jmx_port.to_string(),
            ),
            ("MAX_HEAP_SIZE".to_string(), format!("{}m", config.mem_mb)),
            (
                "HEAP_NEWSIZE".to_string(),
                format!("{}m", (config.cpu_cores * 100.0) as u64),
            ),
        ]);

        Ok(NodeTask {
            task_id: format!("{executor_id}.server"),
            executor_id: executor_id.to_string(),
            cpu_cores: config.cpu_cores,
            mem_mb: config.mem_mb,
            disk_mb: config.disk_mb,
            ports: ports::all_ports(config).into_values().collect(),
            details: TaskDetails::CassandraServerRun {
                // Started in the foreground so the executor can watch the
                // process and know its PID.
                command: vec![
                    format!("apache-cassandra-{}/bin/cassandra", config.cassandra_version),
                    "-p".to_string(),
                    "cassandra.pid".to_string(),
                    "-f".to_string(),
                ],
                config: CassandraServerConfig { variables },
                version: config.cassandra_version.clone(),
                env,
                jmx: node.jmx_connect.clone(),
            },
        })
    }

    // ── Health checks ──────────────────────────────────────────────

    fn should_run_health_check(
        &self,
        executor_id: &str,
        config: &FrameworkConfiguration,
    ) -> SchedulerResult<bool> {
        if config.health_check_interval_seconds <= 0 {
            return Ok(false);
        }
        match self.health_check_history.last(executor_id)? {
            None => Ok(true),
            Some(previous) => {
                let elapsed = self.clock.now_ms().saturating_sub(previous.timestamp_ms);
                Ok(elapsed > config.health_check_interval_seconds as u64 * 1000)
            }
        }
    }

    pub fn last_health_check(
        &self,
        executor_id: &str,
    ) -> SchedulerResult<Option<HealthCheckHistoryEntry>> {
        Ok(self.health_check_history.last(executor_id)?)
    }

    /// Record a health-check result reported by an executor.
    ///
    /// Unhealthy results are recorded only; they do not (yet) remove the
    /// server task.
    pub fn record_health_check(
        &self,
        executor_id: &str,
        details: HealthCheckDetails,
    ) -> SchedulerResult<()> {
        if !details.healthy {
            info!(executor_id, msg = %details.msg, "health check result unhealthy");
        }
        self.health_check_history.record(HealthCheckHistoryEntry {
            executor_id: executor_id.to_string(),
            timestamp_ms: self.clock.now_ms(),
            details,
        })?;
        Ok(())
    }

    // ── Metadata and removal ───────────────────────────────────────

    /// Store the IP an executor reported after its metadata probe ran.
    pub fn add_executor_metadata(&self, metadata: ExecutorMetadata) -> SchedulerResult<()> {
        Ok(self.cluster_state.add_executor_metadata(metadata)?)
    }

    fn executor_metadata(&self, executor_id: &str) -> SchedulerResult<Option<ExecutorMetadata>> {
        Ok(self
            .cluster_state
            .executor_metadata()?
            .into_iter()
            .find(|m| m.executor_id == executor_id))
    }

    /// Apply a terminal task status: clear the matching task field.
    ///
    /// Losing the metadata task invalidates the server task and the
    /// executor-metadata record as well. If the lost task was the current
    /// cluster-job node, that node is failed and moved to the completed
    /// list.
    pub fn remove_task(&self, task_id: &str, status: &TaskStatus) -> SchedulerResult<()> {
        let mut state = self.cluster_state.get()?;
        let mut changed = false;
        let mut dropped_executors: Vec<String> = Vec::new();

        for node in &mut state.nodes {
            if node
                .metadata_task
                .as_ref()
                .is_some_and(|t| t.task_id == task_id)
            {
                if let Some(task) = node.metadata_task.take() {
                    dropped_executors.push(task.executor_id);
                }
                node.server_task = None;
                changed = true;
            } else if node
                .server_task
                .as_ref()
                .is_some_and(|t| t.task_id == task_id)
            {
                node.server_task = None;
                changed = true;
            }
        }

        if !dropped_executors.is_empty() {
            state
                .executor_metadata
                .retain(|m| !dropped_executors.contains(&m.executor_id));
        }
        if changed {
            self.cluster_state.set(&state)?;
            info!(task_id, state = %status.state, "task removed");
        }

        if let Some(job) = self.jobs_state.current_job()? {
            if job.current_node.as_ref().is_some_and(|n| n.task_id == task_id) {
                self.jobs_state.fail_current_node(status.failure_message())?;
            }
        }
        Ok(())
    }

    /// An entire executor terminated: clear both task fields on every
    /// node sharing it and drop its metadata record.
    pub fn remove_executor(&self, executor_id: &str) -> SchedulerResult<()> {
        let mut state = self.cluster_state.get()?;
        for node in &mut state.nodes {
            if node
                .executor
                .as_ref()
                .is_some_and(|e| e.executor_id == executor_id)
            {
                node.metadata_task = None;
                node.server_task = None;
            }
        }
        state.executor_metadata.retain(|m| m.executor_id != executor_id);
        self.cluster_state.set(&state)?;
        info!(executor_id, "executor removed");
        Ok(())
    }

    // ── Administration ─────────────────────────────────────────────

    /// Change the target node count; invalid values are logged and the
    /// previous value retained. Returns the effective count.
    pub fn update_node_count(&self, number_of_nodes: u32) -> SchedulerResult<u32> {
        let registered = self.cluster_state.node_counts()?.node_count;
        let result = if number_of_nodes < registered {
            Err(StateError::InvalidConfiguration(format!(
                "number of nodes {number_of_nodes} below registered count {registered}"
            )))
        } else {
            self.configuration.set_number_of_nodes(number_of_nodes)
        };
        if let Err(error) = result {
            info!(%error, "cannot update number of nodes");
        }
        Ok(self.configuration.get()?.number_of_nodes)
    }

    /// IPs of all seed nodes, in registration order.
    pub fn seed_nodes(&self) -> SchedulerResult<Vec<String>> {
        Ok(self.cluster_state.get()?.seed_node_ips())
    }

    // ── Lookups ────────────────────────────────────────────────────

    pub fn node_for_hostname(&self, hostname: &str) -> SchedulerResult<Option<CassandraNode>> {
        Ok(self
            .cluster_state
            .nodes()?
            .into_iter()
            .find(|n| n.hostname == hostname))
    }

    pub fn node_for_executor_id(
        &self,
        executor_id: &str,
    ) -> SchedulerResult<Option<CassandraNode>> {
        Ok(self.cluster_state.nodes()?.into_iter().find(|n| {
            n.executor
                .as_ref()
                .is_some_and(|e| e.executor_id == executor_id)
        }))
    }
}

fn config_variable(name: &str, value: &str) -> ConfigVariable {
    ConfigVariable {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn metadata_task(executor_id: &str, ip: &str) -> NodeTask {
    NodeTask {
        task_id: executor_id.to_string(),
        executor_id: executor_id.to_string(),
        cpu_cores: EXECUTOR_CPU_CORES,
        mem_mb: EXECUTOR_MEM_MB,
        disk_mb: EXECUTOR_DISK_MB,
        ports: Vec::new(),
        details: TaskDetails::ExecutorMetadata {
            executor_id: executor_id.to_string(),
            ip: ip.to_string(),
        },
    }
}

fn resolve_hostname(hostname: &str) -> Result<IpAddr, SchedulerError> {
    let mut addrs = (hostname, 0u16)
        .to_socket_addrs()
        .map_err(|e| SchedulerError::HostUnresolvable {
            hostname: hostname.to_string(),
            detail: e.to_string(),
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| SchedulerError::HostUnresolvable {
            hostname: hostname.to_string(),
            detail: "no addresses".to_string(),
        })
}

/// OS-assigned free port for loopback JMX.
///
/// Known limitation: the port is released before the executor binds it,
/// so another process may claim it in between.
fn free_jmx_port() -> SchedulerResult<u16> {
    let bind = || -> std::io::Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        Ok(listener.local_addr()?.port())
    };
    bind().map_err(|e| SchedulerError::HostUnresolvable {
        hostname: "127.0.0.1".to_string(),
        detail: format!("jmx port probe failed: {e}"),
    })
}
