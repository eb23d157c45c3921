//! Integration test modules for hostgraph
//!
//! - engine: Engine lifecycle, builder, shutdown
//! - rack: Serial chain processing
//! - patchbay: Groups, connections and naming
//! - events: MIDI and CV through the graph
//! - notifications: Postponed server notifications

pub mod engine;
pub mod events;
pub mod notifications;
pub mod patchbay;
pub mod rack;
