//! Inbound and outbound exchange types of the decision core.
//!
//! `Offer` and `TaskStatus` arrive from the cluster-manager transport;
//! `TasksForOffer` is what a satisfied offer yields back to it.

use cassgrid_state::{NodeExecutor, NodeTask, TaskDetails};

/// A resource advertisement for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub id: String,
    pub hostname: String,
    pub resources: OfferResources,
}

/// The resources an offer carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferResources {
    pub cpus: f64,
    pub mem_mb: u64,
    pub disk_mb: u64,
    /// Closed port ranges, e.g. `(31000, 32000)`.
    pub port_ranges: Vec<(u64, u64)>,
}

impl OfferResources {
    pub fn contains_port(&self, port: u64) -> bool {
        self.port_ranges
            .iter()
            .any(|(begin, end)| (*begin..=*end).contains(&port))
    }
}

/// Terminal task-status notification from the cluster manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: String,
    pub reason: String,
    pub source: String,
    pub healthy: Option<bool>,
    pub message: String,
}

impl TaskStatus {
    /// The failure string recorded on a cluster-job node whose task was
    /// lost.
    pub fn failure_message(&self) -> String {
        format!(
            "TaskStatus:{}, reason:{}, source:{}, healthy:{}, message:{}",
            self.state,
            self.reason,
            self.source,
            self.healthy.map_or_else(|| "unknown".to_string(), |h| h.to_string()),
            self.message
        )
    }
}

/// What one offer yields: fresh task launches plus payloads submitted to
/// the already-running executor.
#[derive(Debug, Clone, PartialEq)]
pub struct TasksForOffer {
    pub executor: NodeExecutor,
    pub launch_tasks: Vec<NodeTask>,
    pub submit_tasks: Vec<TaskDetails>,
}

impl TasksForOffer {
    pub fn new(executor: NodeExecutor) -> Self {
        Self {
            executor,
            launch_tasks: Vec::new(),
            submit_tasks: Vec::new(),
        }
    }

    pub fn has_any_task(&self) -> bool {
        !self.launch_tasks.is_empty() || !self.submit_tasks.is_empty()
    }
}
