//! Offer resource matching.
//!
//! Compares an offer against the server-task requirements and reports
//! every shortfall as a human-readable reason. The comparison is strict:
//! the offer must carry strictly more cpu/mem/disk than required.

use std::collections::BTreeMap;

use crate::offer::Offer;

/// Check an offer against cpu/mem/disk requirements and a named-port map.
///
/// Returns one message per failing constraint; an empty list means the
/// offer satisfies the requirements.
pub fn check_resources(
    offer: &Offer,
    cpu_cores: f64,
    mem_mb: u64,
    disk_mb: u64,
    ports: &BTreeMap<String, u16>,
) -> Vec<String> {
    let mut errors = Vec::new();
    let available = &offer.resources;

    if available.cpus <= cpu_cores {
        errors.push(format!(
            "Not enough cpu resources. Required {} only {} available.",
            cpu_cores, available.cpus
        ));
    }
    if available.mem_mb <= mem_mb {
        errors.push(format!(
            "Not enough mem resources. Required {} only {} available.",
            mem_mb, available.mem_mb
        ));
    }
    if available.disk_mb <= disk_mb {
        errors.push(format!(
            "Not enough disk resources. Required {} only {} available.",
            disk_mb, available.disk_mb
        ));
    }

    for (name, port) in ports {
        if !available.contains_port(u64::from(*port)) {
            errors.push(format!("Unavailable port {port} ({name})."));
        }
    }

    errors
}
