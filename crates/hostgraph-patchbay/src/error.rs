//! Error types for hostgraph-patchbay.

use thiserror::Error;

/// Error type for patchbay operations that resolve names or parse records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Invalid position '{0}' (expected x1:y1:x2:y2)")]
    InvalidPosition(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
