//! Integration tests for the hostgraph routing engine
//!
//! Every test drives the engine the way an audio server would: blocks are
//! run through the `AudioCallbackDriver` by hand, with no real audio device.
//!
//! Test categories:
//! - Engine: lifecycle, builder, idempotent close
//! - Rack: serial chain, bypass, contention
//! - Patchbay: groups, connections, name disambiguation, plugin ids
//! - Events: MIDI ordering, CV sources, panic
//! - Notifications: concurrent postponing and draining
//!
//! Run with:
//! ```bash
//! cargo test -p hostgraph --test integration_tests
//! ```

mod helpers;
mod integration;
