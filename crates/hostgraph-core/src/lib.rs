//! Real-time routing primitives for a plugin host.
//!
//! # Primary API
//!
//! - [`EventBuffer`] / [`EngineEvent`]: per-block, time-ordered event storage
//! - [`Port`]: audio, CV and event ports with the [`AudioSink`], [`CvSink`]
//!   and [`EventSink`] capabilities
//! - [`ClientPortRegistry`]: the named ports of one plugin client
//! - [`CvSourceMerger`]: CV inputs turned into parameter events
//! - [`Plugin`] / [`PluginSlot`]: the hosted plugin interface
//! - [`EngineConfig`]: scalar configuration injected by the surrounding engine
//!
//! # Example
//!
//! ```
//! use hostgraph_core::{ClientPortRegistry, PortKind};
//!
//! let mut client = ClientPortRegistry::new("synth", 512);
//! client.add_port(PortKind::Audio, "out", false);
//! client.add_port(PortKind::Audio, "out", false);
//! assert_eq!(client.port_name(PortKind::Audio, false, 1), Some("out (2)"));
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod compat;

pub(crate) mod lockfree;
pub use lockfree::{max_normalized, AtomicFlag, AtomicFloat, PeakLevels};

pub mod event;
pub use event::{
    ControlEvent, ControlKind, EngineEvent, EventBuffer, EventData, EventKind, MidiData,
    MAX_EVENT_COUNT, MAX_PARAMETER_INDEX, MIDI_CHANNEL_COUNT, NON_MIDI_CHANNEL,
};

mod audio;
pub use audio::AudioBlock;

pub mod port;
pub use port::{
    AudioPort, AudioSink, CvPort, CvRange, CvSink, EventPort, EventSink, Port, PortHandle,
    PortKind, PortMeta,
};

mod cv;
pub use cv::{CvMergeTiming, CvReconfigure, CvSourceMerger, MAX_CV_SOURCES};

mod client;
pub use client::{bump_suffix, ClientPortRegistry};

mod plugin;
pub use plugin::{Plugin, PluginId, PluginSlot, PortCounts};

pub mod shared;
pub use shared::{host_globals, live_plugin_count, FeatureTable, HostGlobals, SharedLease, SharedResource};

mod config;
pub use config::{EngineConfig, ProcessMode};
