//! Centralized error type for the hostgraph umbrella crate.
//!
//! Wraps all member errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] hostgraph_core::Error),

    #[error(transparent)]
    Patchbay(#[from] hostgraph_patchbay::Error),

    #[error(transparent)]
    Graph(#[from] hostgraph_graph::Error),

    #[error("Engine is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
