//! Error types for the cassgrid state layer.

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur in the state layer.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state backend: {0}")]
    Open(String),

    #[error("state backend error: {0}")]
    Backend(String),

    /// The persisted blob cannot be decoded. Fatal to the scheduler.
    #[error("persisted state '{name}' is corrupt: {detail}")]
    Corrupt { name: String, detail: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    /// Rejected administrative change; the previous value is retained.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
