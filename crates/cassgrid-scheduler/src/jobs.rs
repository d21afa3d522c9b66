//! Cluster-job orchestration.
//!
//! A cluster job (repair, cleanup) visits every registered node exactly
//! once, strictly one node at a time, in registration order. The driver
//! is offer-driven like everything else: each offer touching a serving
//! node advances the job by at most one step. Abort is soft — the node
//! in flight completes before the job winds down.

use tracing::{info, warn};

use cassgrid_state::{ClusterJobStatus, ClusterJobType, NodeJobStatus, NodeTask, TaskDetails};

use crate::cluster::CassandraCluster;
use crate::error::SchedulerResult;
use crate::offer::TasksForOffer;

const NODE_JOB_CPU_CORES: f64 = 0.1;
const NODE_JOB_MEM_MB: u64 = 16;
const NODE_JOB_DISK_MB: u64 = 16;

impl CassandraCluster {
    /// Start a cluster-wide job. Returns `false` when another job is
    /// already current.
    pub fn start_cluster_job(&self, job_type: ClusterJobType) -> SchedulerResult<bool> {
        if self.jobs_state().current_job()?.is_some() {
            return Ok(false);
        }

        let remaining_nodes: Vec<String> = self
            .cluster_state()
            .nodes()?
            .into_iter()
            .filter_map(|node| node.executor.map(|e| e.executor_id))
            .collect();

        let job = ClusterJobStatus {
            job_type,
            started_timestamp_ms: self.clock().now_ms(),
            finished_timestamp_ms: None,
            aborted: false,
            remaining_nodes,
            current_node: None,
            completed_nodes: Vec::new(),
        };
        self.jobs_state().set_current_job(Some(job))?;
        info!(%job_type, "cluster job started");
        Ok(true)
    }

    /// Soft-abort the current job of the given type. The in-flight node
    /// completes; no further nodes are started.
    pub fn abort_cluster_job(&self, job_type: ClusterJobType) -> SchedulerResult<bool> {
        let Some(mut job) = self.jobs_state().current_job()? else {
            return Ok(false);
        };
        if job.job_type != job_type || job.aborted {
            return Ok(false);
        }
        job.aborted = true;
        self.jobs_state().set_current_job(Some(job))?;
        info!(%job_type, "cluster job aborted");
        Ok(true)
    }

    pub fn current_cluster_job(&self) -> SchedulerResult<Option<ClusterJobStatus>> {
        Ok(self.jobs_state().current_job()?)
    }

    pub fn last_cluster_job(
        &self,
        job_type: ClusterJobType,
    ) -> SchedulerResult<Option<ClusterJobStatus>> {
        Ok(self.jobs_state().last_job(job_type)?)
    }

    /// Apply a node-job status report from an executor.
    pub fn on_node_job_status(&self, status: NodeJobStatus) -> SchedulerResult<()> {
        let Some(job) = self.jobs_state().current_job()? else {
            return Ok(());
        };
        if job.job_type != status.job_type {
            warn!(
                got = %status.job_type,
                expected = %job.job_type,
                "ignoring node job status of unexpected type"
            );
            return Ok(());
        }

        info!(
            executor_id = %status.executor_id,
            running = status.running,
            "node job status"
        );
        self.jobs_state()
            .update_node_status(status, self.clock().now_ms())?;
        Ok(())
    }

    /// Advance the current job by one step for the offer's node.
    pub(crate) fn handle_cluster_job(
        &self,
        executor_id: &str,
        tasks: &mut TasksForOffer,
    ) -> SchedulerResult<()> {
        let Some(job) = self.jobs_state().current_job()? else {
            return Ok(());
        };

        if let Some(current) = &job.current_node {
            // Only the in-flight node gets attention: a status probe.
            if current.executor_id == executor_id {
                tasks.submit_tasks.push(TaskDetails::NodeJobStatus);
                info!(
                    job_type = %job.job_type,
                    executor_id,
                    "inquiring cluster job status"
                );
            }
            return Ok(());
        }

        if job.aborted {
            self.jobs_state().set_current_job(None)?;
            info!(job_type = %job.job_type, "aborted cluster job wound down");
            return Ok(());
        }

        if job.remaining_nodes.is_empty() {
            self.jobs_state().finish_job(job)?;
            return Ok(());
        }

        if !job.remaining_nodes.iter().any(|id| id == executor_id) {
            // This node has already been visited.
            return Ok(());
        }

        let Some(node) = self.node_for_executor_id(executor_id)? else {
            // The executor no longer maps to a node: skip it.
            let mut job = job;
            job.remaining_nodes.retain(|id| id != executor_id);
            self.jobs_state().set_current_job(Some(job))?;
            return Ok(());
        };

        let task = NodeTask {
            task_id: format!("{executor_id}.{}", job.job_type),
            executor_id: executor_id.to_string(),
            cpu_cores: NODE_JOB_CPU_CORES,
            mem_mb: NODE_JOB_MEM_MB,
            disk_mb: NODE_JOB_DISK_MB,
            ports: Vec::new(),
            details: TaskDetails::NodeJob {
                job_type: job.job_type,
            },
        };
        let current = NodeJobStatus {
            executor_id: executor_id.to_string(),
            task_id: task.task_id.clone(),
            job_type: job.job_type,
            started_timestamp_ms: self.clock().now_ms(),
            running: true,
            failed: false,
            failure_message: None,
        };

        info!(
            job_type = %job.job_type,
            ip = %node.ip,
            hostname = %node.hostname,
            "starting cluster job on node"
        );
        tasks.launch_tasks.push(task);
        self.jobs_state().next_node(job, current)?;
        Ok(())
    }
}
