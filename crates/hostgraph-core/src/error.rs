//! Error types for hostgraph-core.

use thiserror::Error;

/// Error type for hostgraph-core operations.
///
/// Audio-path operations never return this; they report failure through
/// `bool`/`Option` and a log line. These variants cover setup-time checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
