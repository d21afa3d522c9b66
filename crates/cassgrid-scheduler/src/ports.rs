//! Symbolic port registry.
//!
//! Resolves the well-known Cassandra port names to numeric ports, with
//! per-framework overrides from the configuration. See the Cassandra
//! firewall documentation for the default assignments.

use std::collections::BTreeMap;

use cassgrid_state::FrameworkConfiguration;

use crate::error::SchedulerError;

pub const PORT_STORAGE: &str = "storage_port";
pub const PORT_STORAGE_SSL: &str = "ssl_storage_port";
pub const PORT_JMX: &str = "jmx_port";
pub const PORT_NATIVE: &str = "native_transport_port";
pub const PORT_RPC: &str = "rpc_port";

const DEFAULT_PORT_MAPPINGS: &[(&str, u16)] = &[
    (PORT_STORAGE, 7000),
    (PORT_STORAGE_SSL, 7001),
    (PORT_JMX, 7199),
    (PORT_NATIVE, 9042),
    (PORT_RPC, 9160),
];

/// Resolve a symbolic port name: configuration override first, then the
/// default. An unknown name is a programming error.
pub fn port_for(config: &FrameworkConfiguration, name: &str) -> Result<u16, SchedulerError> {
    if let Some(port) = config.port_mappings.get(name) {
        return Ok(*port);
    }
    DEFAULT_PORT_MAPPINGS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| *p)
        .ok_or_else(|| SchedulerError::UnknownPort(name.to_string()))
}

/// Every default port name with overrides applied.
pub fn all_ports(config: &FrameworkConfiguration) -> BTreeMap<String, u16> {
    DEFAULT_PORT_MAPPINGS
        .iter()
        .map(|(name, default)| {
            let port = config.port_mappings.get(*name).copied().unwrap_or(*default);
            (name.to_string(), port)
        })
        .collect()
}
