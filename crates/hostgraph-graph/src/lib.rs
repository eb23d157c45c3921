//! Real-time routing for a plugin host.
//!
//! - [`RoutingGraph`]: plugins in rack (serial stereo chain) or patchbay
//!   (free connections) mode, with the topology mirrored in a
//!   [`TopologyDirectory`](hostgraph_patchbay::TopologyDirectory)
//! - [`AudioCallbackDriver`]: the per-callback entry point on the audio thread
//! - [`Runner`]: lets the control thread park the audio thread around
//!   structural changes
//!
//! # Example
//!
//! ```ignore
//! use hostgraph_core::EngineConfig;
//! use hostgraph_graph::{AudioCallbackDriver, GraphShape, RoutingGraph};
//! use hostgraph_patchbay::NullSink;
//! use std::sync::Arc;
//!
//! let graph = RoutingGraph::new(&EngineConfig::rack(), Arc::new(NullSink));
//! graph.create(GraphShape::stereo())?;
//! graph.activate()?;
//!
//! let mut driver = AudioCallbackDriver::new(Arc::clone(&graph));
//! // in the server callback
//! driver.on_block(&inputs, &mut outputs, frames);
//! ```

pub mod error;
pub use error::{Error, Result};

mod runner;
pub use runner::{RunGuard, Runner, ScopedRunnerStopper};

mod routing;

mod node;
pub use node::NodeState;

mod patchbay;
mod rack;

mod graph;
pub use graph::{
    BlockReport, BlockStatus, GraphShape, GraphStatus, ProcessBuffers, RoutingGraph, SkipReason,
    AUDIO_INPUT_GROUP, AUDIO_OUTPUT_GROUP, CV_INPUT_GROUP, CV_OUTPUT_GROUP, MIDI_INPUT_GROUP,
    MIDI_OUTPUT_GROUP, RACK_GROUP,
};

mod driver;
pub use driver::{AudioCallbackDriver, DriverAction, DriverHandle, DriverStats};
