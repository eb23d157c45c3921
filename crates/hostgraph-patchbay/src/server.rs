//! Types facing the external audio server.

use crate::directory::PortFlags;
use crate::drain::{NotificationDrain, PostponedEvent};
use hostgraph_core::compat::Arc;

/// Handle held by audio-server callback threads.
///
/// Every method only postpones an event; nothing here touches the directory
/// or the routing graph.
#[derive(Debug, Clone)]
pub struct ServerNotifications {
    drain: Arc<NotificationDrain>,
}

impl ServerNotifications {
    pub fn new(drain: Arc<NotificationDrain>) -> Self {
        Self { drain }
    }

    pub fn client_registered(&self, name: &str) {
        self.drain.postpone(PostponedEvent::ClientRegistered { name: name.into() });
    }

    pub fn client_unregistered(&self, name: &str) {
        self.drain
            .postpone(PostponedEvent::ClientUnregistered { name: name.into() });
    }

    pub fn client_position_changed(&self, name: &str, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.drain.postpone(PostponedEvent::ClientPositionChanged {
            name: name.into(),
            x1,
            y1,
            x2,
            y2,
        });
    }

    pub fn port_registered(&self, short_name: &str, full_name: &str, flags: PortFlags) {
        self.drain.postpone(PostponedEvent::PortRegistered {
            short_name: short_name.into(),
            full_name: full_name.into(),
            flags,
        });
    }

    pub fn port_unregistered(&self, full_name: &str) {
        self.drain.postpone(PostponedEvent::PortUnregistered {
            full_name: full_name.into(),
        });
    }

    pub fn ports_connected(&self, port_a: &str, port_b: &str) {
        self.drain.postpone(PostponedEvent::PortConnected {
            port_a: port_a.into(),
            port_b: port_b.into(),
        });
    }

    pub fn ports_disconnected(&self, port_a: &str, port_b: &str) {
        self.drain.postpone(PostponedEvent::PortDisconnected {
            port_a: port_a.into(),
            port_b: port_b.into(),
        });
    }

    pub fn port_renamed(&self, old_full_name: &str, new_full_name: &str, new_short_name: &str) {
        self.drain.postpone(PostponedEvent::PortRenamed {
            old_full_name: old_full_name.into(),
            new_full_name: new_full_name.into(),
            new_short_name: new_short_name.into(),
        });
    }
}

/// Musical position reported by the server's timebase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarBeatTick {
    pub bar: i32,
    pub beat: i32,
    pub tick: f64,
    pub beats_per_bar: f32,
    pub beat_type: f32,
    pub ticks_per_beat: f64,
    pub beats_per_minute: f64,
}

/// Transport state at the start of a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportInfo {
    pub playing: bool,
    pub frame: u64,
    /// Server time in microseconds; 0 when unknown.
    pub usecs: u64,
    /// `None` when the server has no valid timebase.
    pub bbt: Option<BarBeatTick>,
}

impl TransportInfo {
    /// Stopped at frame 0 with no timebase.
    pub const INVALID: TransportInfo = TransportInfo {
        playing: false,
        frame: 0,
        usecs: 0,
        bbt: None,
    };

    pub fn is_valid(&self) -> bool {
        self.bbt.is_some()
    }
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Transport query of the audio server. Called from the audio thread.
pub trait TransportSource: Send + Sync {
    fn query(&self) -> TransportInfo;
}
