//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur in the decision core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// DNS failure during node registration; the offer goes unsatisfied.
    #[error("cannot resolve hostname '{hostname}': {detail}")]
    HostUnresolvable { hostname: String, detail: String },

    /// A port name outside the defaults and overrides. Programming error.
    #[error("no port mapping for '{0}'")]
    UnknownPort(String),

    #[error("state error: {0}")]
    State(#[from] cassgrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
