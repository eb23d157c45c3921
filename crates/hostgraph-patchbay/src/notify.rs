//! Upper-layer topology notifications.
//!
//! The directory reports every change as a [`PatchbayNotification`] to a
//! [`NotificationSink`], always after its own lock is released.

use crate::directory::{ConnectionId, GroupId, PortFlags, PortId};
use crossbeam_channel::{Receiver, Sender};
use hostgraph_core::PluginId;

/// One topology change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchbayNotification {
    ClientAdded {
        group: GroupId,
        plugin: Option<PluginId>,
        name: String,
    },
    ClientRemoved {
        group: GroupId,
    },
    ClientRenamed {
        group: GroupId,
        name: String,
    },
    ClientPositionChanged {
        group: GroupId,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    },
    PortAdded {
        group: GroupId,
        port: PortId,
        flags: PortFlags,
        name: String,
    },
    PortRemoved {
        group: GroupId,
        port: PortId,
    },
    PortChanged {
        group: GroupId,
        port: PortId,
        name: String,
    },
    ConnectionAdded {
        connection: ConnectionId,
        group_a: GroupId,
        port_a: PortId,
        group_b: GroupId,
        port_b: PortId,
    },
    ConnectionRemoved {
        connection: ConnectionId,
    },
}

/// Flattened `(group, port-or-flags, extra, label)` form of a notification.
///
/// Connection notifications carry the connection id in `group` and
/// `"groupA:portA:groupB:portB"` as label; position changes carry
/// `"x1:y1:x2:y2"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationArgs {
    pub group: u32,
    pub value: i32,
    pub extra: i32,
    pub label: Option<String>,
}

impl PatchbayNotification {
    pub fn args(&self) -> NotificationArgs {
        let args = |group: u32, value: i32, extra: i32, label: Option<String>| NotificationArgs {
            group,
            value,
            extra,
            label,
        };
        match self {
            Self::ClientAdded {
                group,
                plugin,
                name,
            } => args(
                group.0,
                0,
                plugin.map(|p| p.0 as i32).unwrap_or(-1),
                Some(name.clone()),
            ),
            Self::ClientRemoved { group } => args(group.0, 0, 0, None),
            Self::ClientRenamed { group, name } => args(group.0, 0, 0, Some(name.clone())),
            Self::ClientPositionChanged {
                group,
                x1,
                y1,
                x2,
                y2,
            } => args(group.0, *x1, *y1, Some(format!("{x1}:{y1}:{x2}:{y2}"))),
            Self::PortAdded {
                group,
                port,
                flags,
                name,
            } => args(group.0, port.0 as i32, flags.bits() as i32, Some(name.clone())),
            Self::PortRemoved { group, port } => args(group.0, port.0 as i32, 0, None),
            Self::PortChanged { group, port, name } => {
                args(group.0, port.0 as i32, 0, Some(name.clone()))
            }
            Self::ConnectionAdded {
                connection,
                group_a,
                port_a,
                group_b,
                port_b,
            } => args(
                connection.0,
                0,
                0,
                Some(format!("{}:{}:{}:{}", group_a.0, port_a.0, group_b.0, port_b.0)),
            ),
            Self::ConnectionRemoved { connection } => args(connection.0, 0, 0, None),
        }
    }
}

/// Receiver of topology notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: PatchbayNotification);
}

impl<F> NotificationSink for F
where
    F: Fn(PatchbayNotification) + Send + Sync,
{
    fn notify(&self, notification: PatchbayNotification) {
        self(notification)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: PatchbayNotification) {}
}

/// Forwards notifications to a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<PatchbayNotification>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its unbounded channel.
    pub fn new() -> (Self, Receiver<PatchbayNotification>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: Sender<PatchbayNotification>) -> Self {
        Self { sender }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: PatchbayNotification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Patchbay notification dropped: receiver gone");
        }
    }
}
