//! Error types for sfera-core.

use thiserror::Error;

/// Error type for sfera-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("{kind} {value} out of range (1-{max})")]
    IndexOutOfRange {
        kind: &'static str,
        value: usize,
        max: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
