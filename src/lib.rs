//! # Hostgraph - Plugin Host Routing Engine
//!
//! Real-time routing core of a plugin host: hosted plugins wired either as a
//! serial stereo rack or as a free patchbay, driven block by block from an
//! audio-server callback.
//!
//! ## Architecture
//!
//! Hostgraph is an umbrella crate that coordinates:
//! - **hostgraph-core** - Event buffers, ports, client port registries, CV
//!   source merging, plugin slots, engine configuration
//! - **hostgraph-patchbay** - Topology directory, postponed server
//!   notifications, canvas positions
//! - **hostgraph-graph** - Routing graph (rack and patchbay), runner control,
//!   audio callback driver
//!
//! ## Quick Start
//!
//! ```ignore
//! use hostgraph::prelude::*;
//!
//! let engine = HostEngine::builder()
//!     .patchbay()
//!     .buffer_size(256)
//!     .build()?;
//!
//! let mut driver = engine.driver().expect("driver");
//! let id = engine.add_plugin(Box::new(my_plugin))?;
//! engine.connect_by_name("Audio Input:capture_1", "my-plugin:in")?;
//!
//! // audio-server callback
//! driver.on_block(&inputs, &mut outputs, frames);
//!
//! // control thread
//! engine.idle();
//! ```

/// Re-export of hostgraph-core for direct access
pub use hostgraph_core as core;
pub use hostgraph_graph as graph;
pub use hostgraph_patchbay as patchbay;

pub use hostgraph_core::{
    AudioBlock, ClientPortRegistry, ControlEvent, ControlKind, CvMergeTiming, EngineConfig,
    EngineEvent, EventBuffer, Plugin, PluginId, PluginSlot, PortHandle, PortKind, ProcessMode,
};

pub use hostgraph_graph::{
    AudioCallbackDriver, BlockStatus, DriverAction, DriverHandle, GraphShape, RoutingGraph,
};

pub use hostgraph_patchbay::{
    ConnectionId, GroupId, GroupPosition, NotificationSink, PatchbayNotification, PortId,
    ServerNotifications, TopologyDirectory, TransportInfo, TransportSource,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;

pub use builder::HostEngineBuilder;
pub use engine::HostEngine;

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{HostEngine, HostEngineBuilder};

    // Plugins
    pub use crate::core::{AudioBlock, ClientPortRegistry, EngineEvent, Plugin, PluginId, PortKind};

    // Driver
    pub use crate::graph::{AudioCallbackDriver, BlockStatus};

    // Patchbay
    pub use crate::patchbay::{ChannelSink, GroupPosition, ServerNotifications};
}
