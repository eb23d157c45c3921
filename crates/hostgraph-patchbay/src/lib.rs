//! Patchbay bookkeeping for a plugin host.
//!
//! - [`TopologyDirectory`]: groups, ports and connections with stable ids
//! - [`NotificationDrain`]: server notifications postponed from foreign
//!   threads and replayed on the control thread
//! - [`NotificationSink`]: upper-layer topology callbacks
//! - [`GroupPosition`]: saved canvas positions
//!
//! # Example
//!
//! ```
//! use hostgraph_patchbay::{NotificationDrain, PortFlags, ServerNotifications, TopologyDirectory};
//! use std::sync::Arc;
//!
//! let directory = TopologyDirectory::default();
//! let drain = Arc::new(NotificationDrain::new());
//! let server = ServerNotifications::new(Arc::clone(&drain));
//!
//! // on a server thread
//! server.port_registered("capture_1", "system:capture_1", PortFlags::AUDIO);
//!
//! // on the control thread
//! drain.drain(&directory);
//! assert!(directory.find_port("system:capture_1").is_valid());
//! ```

pub mod error;
pub use error::{Error, Result};

mod directory;
pub use directory::{
    Connection, ConnectionId, Group, GroupId, PortEntry, PortFlags, PortId, SnapshotPort,
    TopologyDirectory, TopologySnapshot,
};

mod notify;
pub use notify::{ChannelSink, NotificationArgs, NotificationSink, NullSink, PatchbayNotification};

mod drain;
pub use drain::{NotificationDrain, PostponedEvent};

mod positions;
pub use positions::{parse_coordinates, GroupPosition};

mod server;
pub use server::{BarBeatTick, ServerNotifications, TransportInfo, TransportSource};
