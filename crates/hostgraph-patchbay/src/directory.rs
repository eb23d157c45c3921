//! Groups, ports and connections of the patchbay.
//!
//! Ids are 1-based and come from monotonic counters that survive
//! [`TopologyDirectory::clear`], so an id is never reused while the directory
//! lives. Id 0 means "invalid / not found".
//!
//! # Locking
//!
//! One mutex guards the three collections. Every operation copies out what it
//! needs and releases the lock before notifying the [`NotificationSink`], so
//! a sink may query the directory again.

use crate::notify::{NotificationSink, NullSink, PatchbayNotification};
use crate::positions::GroupPosition;
use hostgraph_core::compat::{Arc, Mutex};
use hostgraph_core::PluginId;
use std::ops::BitOr;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(0);

            #[inline]
            pub fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Patchbay group (client) id.
    GroupId
);
id_type!(
    /// Patchbay port id, unique across all groups.
    PortId
);
id_type!(
    /// Patchbay connection id.
    ConnectionId
);

/// Direction and type bits of a patchbay port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortFlags(u32);

impl PortFlags {
    pub const IS_INPUT: PortFlags = PortFlags(0x01);
    pub const AUDIO: PortFlags = PortFlags(0x02);
    pub const CV: PortFlags = PortFlags(0x04);
    pub const MIDI: PortFlags = PortFlags(0x08);
    pub const OSC: PortFlags = PortFlags(0x10);

    pub const fn empty() -> Self {
        PortFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        PortFlags(bits & 0x1F)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: PortFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_input(self) -> bool {
        self.contains(Self::IS_INPUT)
    }
}

impl BitOr for PortFlags {
    type Output = PortFlags;

    fn bitor(self, rhs: PortFlags) -> PortFlags {
        PortFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub plugin: Option<PluginId>,
    pub position: Option<GroupPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortEntry {
    pub group: GroupId,
    pub port: PortId,
    pub short_name: String,
    pub full_name: String,
    pub flags: PortFlags,
}

impl PortEntry {
    /// All-zero entry returned by failed lookups.
    pub const NONE: PortEntry = PortEntry {
        group: GroupId::INVALID,
        port: PortId::INVALID,
        short_name: String::new(),
        full_name: String::new(),
        flags: PortFlags::empty(),
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.group.is_valid() && self.port.is_valid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub group_a: GroupId,
    pub port_a: PortId,
    pub group_b: GroupId,
    pub port_b: PortId,
}

/// Port of a [`TopologySnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPort {
    pub group: String,
    pub short_name: String,
    pub full_name: String,
    pub flags: PortFlags,
}

/// Full server topology used to rebuild the directory, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub groups: Vec<(String, Option<PluginId>)>,
    pub ports: Vec<SnapshotPort>,
    /// `(output full name, input full name)` pairs.
    pub connections: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    groups: Vec<Group>,
    ports: Vec<PortEntry>,
    connections: Vec<Connection>,
    last_group: u32,
    last_port: u32,
    last_connection: u32,
}

impl Inner {
    fn group_index(&self, id: GroupId) -> Option<usize> {
        self.groups.iter().position(|g| g.id == id)
    }

    fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn port_by_name(&self, full_name: &str) -> Option<&PortEntry> {
        self.ports.iter().find(|p| p.full_name == full_name)
    }
}

/// Bookkeeping of the patchbay topology.
pub struct TopologyDirectory {
    inner: Mutex<Inner>,
    sink: Arc<dyn NotificationSink>,
}

impl Default for TopologyDirectory {
    fn default() -> Self {
        Self::new(Arc::new(NullSink))
    }
}

impl core::fmt::Debug for TopologyDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TopologyDirectory")
            .field("groups", &inner.groups.len())
            .field("ports", &inner.ports.len())
            .field("connections", &inner.connections.len())
            .finish()
    }
}

impl TopologyDirectory {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sink,
        }
    }

    fn emit(&self, notification: PatchbayNotification) {
        self.sink.notify(notification);
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub fn add_group(&self, name: &str) -> GroupId {
        self.add_group_for(name, None)
    }

    /// Add a group, optionally owned by a hosted plugin.
    ///
    /// An existing group with the same name is returned as is.
    pub fn add_group_for(&self, name: &str, plugin: Option<PluginId>) -> GroupId {
        if name.is_empty() {
            tracing::warn!("Patchbay: group name must not be empty");
            return GroupId::INVALID;
        }

        let id = {
            let mut inner = self.inner.lock();
            if let Some(group) = inner.group_by_name(name) {
                return group.id;
            }
            inner.last_group += 1;
            let id = GroupId(inner.last_group);
            inner.groups.push(Group {
                id,
                name: name.to_owned(),
                plugin,
                position: None,
            });
            id
        };

        tracing::debug!("Patchbay: group {} '{}' added", id, name);
        self.emit(PatchbayNotification::ClientAdded {
            group: id,
            plugin,
            name: name.to_owned(),
        });
        id
    }

    /// Remove a group together with its ports and their connections.
    pub fn remove_group(&self, id: GroupId) -> bool {
        let (ports, connections) = {
            let mut inner = self.inner.lock();
            let Some(index) = inner.group_index(id) else {
                return false;
            };
            inner.groups.remove(index);

            let mut connections = Vec::new();
            inner.connections.retain(|c| {
                let touches = c.group_a == id || c.group_b == id;
                if touches {
                    connections.push(c.id);
                }
                !touches
            });

            let mut ports = Vec::new();
            inner.ports.retain(|p| {
                if p.group == id {
                    ports.push(p.port);
                    return false;
                }
                true
            });
            (ports, connections)
        };

        for connection in connections {
            self.emit(PatchbayNotification::ConnectionRemoved { connection });
        }
        for port in ports {
            self.emit(PatchbayNotification::PortRemoved { group: id, port });
        }
        tracing::debug!("Patchbay: group {} removed", id);
        self.emit(PatchbayNotification::ClientRemoved { group: id });
        true
    }

    pub fn rename_group(&self, id: GroupId, name: &str) -> bool {
        if name.is_empty() {
            tracing::warn!("Patchbay: group name must not be empty");
            return false;
        }
        {
            let mut inner = self.inner.lock();
            let Some(index) = inner.group_index(id) else {
                return false;
            };
            inner.groups[index].name = name.to_owned();
        }
        self.emit(PatchbayNotification::ClientRenamed {
            group: id,
            name: name.to_owned(),
        });
        true
    }

    pub fn find_group_id(&self, name: &str) -> Option<GroupId> {
        self.inner.lock().group_by_name(name).map(|g| g.id)
    }

    pub fn group(&self, id: GroupId) -> Option<Group> {
        let inner = self.inner.lock();
        inner.group_index(id).map(|i| inner.groups[i].clone())
    }

    pub fn groups(&self) -> Vec<Group> {
        self.inner.lock().groups.clone()
    }

    // =========================================================================
    // Ports
    // =========================================================================

    /// Add a port to an existing group. Full names must be unique.
    pub fn add_port(&self, group: GroupId, short_name: &str, full_name: &str, flags: PortFlags) -> PortId {
        if short_name.is_empty() || full_name.is_empty() {
            tracing::warn!("Patchbay: port name must not be empty");
            return PortId::INVALID;
        }

        let port = {
            let mut inner = self.inner.lock();
            if inner.group_index(group).is_none() {
                tracing::warn!("Patchbay: port '{}' added to unknown group {}", full_name, group);
                return PortId::INVALID;
            }
            if inner.port_by_name(full_name).is_some() {
                tracing::warn!("Patchbay: port '{}' already registered", full_name);
                return PortId::INVALID;
            }
            inner.last_port += 1;
            let port = PortId(inner.last_port);
            inner.ports.push(PortEntry {
                group,
                port,
                short_name: short_name.to_owned(),
                full_name: full_name.to_owned(),
                flags,
            });
            port
        };

        self.emit(PatchbayNotification::PortAdded {
            group,
            port,
            flags,
            name: short_name.to_owned(),
        });
        port
    }

    /// Remove a port. Connections referencing it are left for their own
    /// disconnect notifications.
    pub fn remove_port(&self, port: PortId) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            inner
                .ports
                .iter()
                .position(|p| p.port == port)
                .map(|i| inner.ports.remove(i))
        };
        match removed {
            Some(entry) => {
                self.emit(PatchbayNotification::PortRemoved {
                    group: entry.group,
                    port: entry.port,
                });
                true
            }
            None => false,
        }
    }

    pub fn remove_port_by_name(&self, full_name: &str) -> bool {
        let port = self.find_port(full_name);
        port.is_valid() && self.remove_port(port.port)
    }

    /// Look a port up by full name; [`PortEntry::NONE`] when missing.
    pub fn find_port(&self, full_name: &str) -> PortEntry {
        self.inner
            .lock()
            .port_by_name(full_name)
            .cloned()
            .unwrap_or(PortEntry::NONE)
    }

    pub fn port(&self, port: PortId) -> Option<PortEntry> {
        self.inner.lock().ports.iter().find(|p| p.port == port).cloned()
    }

    pub fn ports(&self) -> Vec<PortEntry> {
        self.inner.lock().ports.clone()
    }

    pub fn ports_of_group(&self, group: GroupId) -> Vec<PortEntry> {
        self.inner
            .lock()
            .ports
            .iter()
            .filter(|p| p.group == group)
            .cloned()
            .collect()
    }

    /// Rename a port in place; its id does not change.
    pub fn rename_port(&self, port: PortId, short_name: &str, full_name: &str) -> bool {
        let group = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.ports.iter_mut().find(|p| p.port == port) else {
                return false;
            };
            entry.short_name = short_name.to_owned();
            entry.full_name = full_name.to_owned();
            entry.group
        };
        self.emit(PatchbayNotification::PortChanged {
            group,
            port,
            name: short_name.to_owned(),
        });
        true
    }

    pub fn full_port_name(&self, group: GroupId, port: PortId) -> Option<String> {
        self.inner
            .lock()
            .ports
            .iter()
            .find(|p| p.group == group && p.port == port)
            .map(|p| p.full_name.clone())
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Connect two existing ports.
    pub fn add_connection(&self, group_a: GroupId, port_a: PortId, group_b: GroupId, port_b: PortId) -> ConnectionId {
        let id = {
            let mut inner = self.inner.lock();
            let exists = |g: GroupId, p: PortId| inner.ports.iter().any(|e| e.group == g && e.port == p);
            if !exists(group_a, port_a) || !exists(group_b, port_b) {
                tracing::warn!(
                    "Patchbay: connection {}:{} -> {}:{} references a missing port",
                    group_a,
                    port_a,
                    group_b,
                    port_b
                );
                return ConnectionId::INVALID;
            }
            inner.last_connection += 1;
            let id = ConnectionId(inner.last_connection);
            inner.connections.push(Connection {
                id,
                group_a,
                port_a,
                group_b,
                port_b,
            });
            id
        };

        self.emit(PatchbayNotification::ConnectionAdded {
            connection: id,
            group_a,
            port_a,
            group_b,
            port_b,
        });
        id
    }

    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.connections.iter().position(|c| c.id == id) {
                Some(i) => {
                    inner.connections.remove(i);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.emit(PatchbayNotification::ConnectionRemoved { connection: id });
        }
        removed
    }

    pub fn find_connection(&self, group_a: GroupId, port_a: PortId, group_b: GroupId, port_b: PortId) -> Option<ConnectionId> {
        self.inner
            .lock()
            .connections
            .iter()
            .find(|c| c.group_a == group_a && c.port_a == port_a && c.group_b == group_b && c.port_b == port_b)
            .map(|c| c.id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.inner.lock().connections.iter().find(|c| c.id == id).copied()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.inner.lock().connections.clone()
    }

    /// Remove every connection touching `group`.
    pub fn disconnect_group(&self, group: GroupId) -> usize {
        let removed: Vec<ConnectionId> = {
            let mut inner = self.inner.lock();
            let mut removed = Vec::new();
            inner.connections.retain(|c| {
                let touches = c.group_a == group || c.group_b == group;
                if touches {
                    removed.push(c.id);
                }
                !touches
            });
            removed
        };
        for &connection in &removed {
            self.emit(PatchbayNotification::ConnectionRemoved { connection });
        }
        removed.len()
    }

    // =========================================================================
    // Positions
    // =========================================================================

    pub fn set_position(&self, group: GroupId, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
        {
            let mut inner = self.inner.lock();
            let Some(index) = inner.group_index(group) else {
                return false;
            };
            let entry = &mut inner.groups[index];
            let mut position = GroupPosition::new(entry.name.clone(), x1, y1, x2, y2);
            position.plugin = entry.plugin;
            entry.position = Some(position);
        }
        self.emit(PatchbayNotification::ClientPositionChanged {
            group,
            x1,
            y1,
            x2,
            y2,
        });
        true
    }

    /// Positions of every group that has one.
    pub fn positions(&self) -> Vec<GroupPosition> {
        self.inner
            .lock()
            .groups
            .iter()
            .filter_map(|g| g.position.clone())
            .collect()
    }

    /// Apply a saved position to the group it names. Returns the group found.
    pub fn restore_position(&self, position: &GroupPosition, prefix: &str) -> Option<GroupId> {
        let name = position.restore_name(prefix);
        let Some(group) = self.find_group_id(&name) else {
            tracing::info!("Previously saved client '{}' not found", name);
            return None;
        };
        self.set_position(group, position.x1, position.y1, position.x2, position.y2);
        Some(group)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Drop everything; id counters keep running.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.groups.clear();
        inner.ports.clear();
        inner.connections.clear();
    }

    /// Rebuild from a snapshot of the server topology.
    ///
    /// Ports whose group is unknown and connections whose ports are unknown
    /// are skipped.
    pub fn refresh(&self, snapshot: &TopologySnapshot) {
        self.clear();

        for (name, plugin) in &snapshot.groups {
            self.add_group_for(name, *plugin);
        }
        for port in &snapshot.ports {
            let Some(group) = self.find_group_id(&port.group) else {
                tracing::warn!("Patchbay refresh: group '{}' missing for '{}'", port.group, port.full_name);
                continue;
            };
            self.add_port(group, &port.short_name, &port.full_name, port.flags);
        }
        for (a, b) in &snapshot.connections {
            let (a, b) = (self.find_port(a), self.find_port(b));
            if a.is_valid() && b.is_valid() {
                self.add_connection(a.group, a.port, b.group, b.port);
            }
        }
        tracing::debug!("Patchbay refreshed: {:?}", self);
    }

    /// Group and port of a full port name.
    pub fn group_and_port(&self, full_name: &str) -> Option<(GroupId, PortId)> {
        let entry = self.find_port(full_name);
        entry.is_valid().then_some((entry.group, entry.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelSink;
    use hostgraph_core::compat::Weak;

    fn audio_out() -> PortFlags {
        PortFlags::AUDIO
    }

    fn audio_in() -> PortFlags {
        PortFlags::AUDIO | PortFlags::IS_INPUT
    }

    fn two_clients(dir: &TopologyDirectory) -> (PortEntry, PortEntry) {
        let a = dir.add_group("synth");
        let b = dir.add_group("system");
        dir.add_port(a, "out_1", "synth:out_1", audio_out());
        dir.add_port(b, "playback_1", "system:playback_1", audio_in());
        (dir.find_port("synth:out_1"), dir.find_port("system:playback_1"))
    }

    #[test]
    fn test_ids_start_at_one() {
        let dir = TopologyDirectory::default();
        let g = dir.add_group("a");
        assert_eq!(g, GroupId(1));
        let p = dir.add_port(g, "x", "a:x", audio_out());
        assert_eq!(p, PortId(1));
        assert_eq!(dir.add_group("a"), g);
    }

    #[test]
    fn test_ids_never_reused() {
        let dir = TopologyDirectory::default();
        let a = dir.add_group("a");
        dir.remove_group(a);
        let b = dir.add_group("a");
        assert_ne!(a, b);

        dir.clear();
        let c = dir.add_group("a");
        assert!(c.0 > b.0);
    }

    #[test]
    fn test_find_port_sentinel() {
        let dir = TopologyDirectory::default();
        let entry = dir.find_port("nobody:nothing");
        assert!(!entry.is_valid());
        assert_eq!(entry, PortEntry::NONE);
    }

    #[test]
    fn test_add_port_needs_group_and_unique_name() {
        let dir = TopologyDirectory::default();
        assert_eq!(dir.add_port(GroupId(7), "x", "g:x", audio_out()), PortId::INVALID);

        let g = dir.add_group("g");
        assert!(dir.add_port(g, "x", "g:x", audio_out()).is_valid());
        assert_eq!(dir.add_port(g, "x", "g:x", audio_out()), PortId::INVALID);
        assert_eq!(dir.add_group(""), GroupId::INVALID);
    }

    #[test]
    fn test_connection_lifecycle() {
        let dir = TopologyDirectory::default();
        let (a, b) = two_clients(&dir);

        let id = dir.add_connection(a.group, a.port, b.group, b.port);
        assert!(id.is_valid());
        assert_eq!(dir.find_connection(a.group, a.port, b.group, b.port), Some(id));
        assert_eq!(dir.find_connection(b.group, b.port, a.group, a.port), None);

        assert!(dir.remove_connection(id));
        assert!(!dir.remove_connection(id));
        assert!(dir.connections().is_empty());

        assert_eq!(dir.add_connection(a.group, PortId(99), b.group, b.port), ConnectionId::INVALID);
    }

    #[test]
    fn test_remove_port_keeps_connections() {
        let dir = TopologyDirectory::default();
        let (a, b) = two_clients(&dir);
        let id = dir.add_connection(a.group, a.port, b.group, b.port);

        assert!(dir.remove_port_by_name("synth:out_1"));
        assert!(!dir.remove_port_by_name("synth:out_1"));
        assert!(dir.connection(id).is_some());
    }

    #[test]
    fn test_remove_group_cascades() {
        let dir = TopologyDirectory::default();
        let (a, b) = two_clients(&dir);
        dir.add_connection(a.group, a.port, b.group, b.port);

        assert!(dir.remove_group(a.group));
        assert!(dir.ports_of_group(a.group).is_empty());
        assert!(dir.connections().is_empty());
        assert_eq!(dir.ports().len(), 1);
        assert!(!dir.remove_group(a.group));
    }

    #[test]
    fn test_rename_keeps_id() {
        let dir = TopologyDirectory::default();
        let (a, _) = two_clients(&dir);
        assert!(dir.rename_port(a.port, "main_1", "synth:main_1"));
        let renamed = dir.find_port("synth:main_1");
        assert_eq!(renamed.port, a.port);
        assert!(!dir.find_port("synth:out_1").is_valid());

        assert!(dir.rename_group(a.group, "lead"));
        assert_eq!(dir.find_group_id("lead"), Some(a.group));
        assert_eq!(dir.find_group_id("synth"), None);
    }

    #[test]
    fn test_notifications_order() {
        let (sink, rx) = ChannelSink::new();
        let dir = TopologyDirectory::new(Arc::new(sink));
        let (a, b) = two_clients(&dir);
        let conn = dir.add_connection(a.group, a.port, b.group, b.port);
        dir.remove_group(a.group);

        let got: Vec<PatchbayNotification> = rx.try_iter().collect();
        assert_eq!(got.len(), 8);
        assert!(matches!(got[0], PatchbayNotification::ClientAdded { .. }));
        assert_eq!(
            got[5],
            PatchbayNotification::ConnectionRemoved { connection: conn }
        );
        assert_eq!(
            got[6],
            PatchbayNotification::PortRemoved {
                group: a.group,
                port: a.port
            }
        );
        assert_eq!(got[7], PatchbayNotification::ClientRemoved { group: a.group });
    }

    #[test]
    fn test_sink_may_query_directory() {
        let slot: Arc<Mutex<Option<Weak<TopologyDirectory>>>> = Arc::new(Mutex::new(None));
        let names = Arc::new(Mutex::new(Vec::new()));
        let (slot_in_sink, names_in_sink) = (Arc::clone(&slot), Arc::clone(&names));
        let sink = move |n: PatchbayNotification| {
            let dir = slot_in_sink.lock().as_ref().and_then(Weak::upgrade);
            if let (PatchbayNotification::ClientAdded { group, .. }, Some(dir)) = (n, dir) {
                names_in_sink.lock().push(dir.group(group).map(|g| g.name));
            }
        };

        let dir = Arc::new(TopologyDirectory::new(Arc::new(sink)));
        *slot.lock() = Some(Arc::downgrade(&dir));
        dir.add_group("x");
        assert_eq!(*names.lock(), vec![Some("x".to_string())]);
    }

    #[test]
    fn test_refresh_from_snapshot() {
        let dir = TopologyDirectory::default();
        let stale = dir.add_group("stale");

        let snapshot = TopologySnapshot {
            groups: vec![("system".into(), None), ("synth".into(), Some(PluginId(0)))],
            ports: vec![
                SnapshotPort {
                    group: "synth".into(),
                    short_name: "out".into(),
                    full_name: "synth:out".into(),
                    flags: audio_out(),
                },
                SnapshotPort {
                    group: "system".into(),
                    short_name: "playback_1".into(),
                    full_name: "system:playback_1".into(),
                    flags: audio_in(),
                },
                SnapshotPort {
                    group: "ghost".into(),
                    short_name: "x".into(),
                    full_name: "ghost:x".into(),
                    flags: audio_in(),
                },
            ],
            connections: vec![
                ("synth:out".into(), "system:playback_1".into()),
                ("synth:out".into(), "ghost:x".into()),
            ],
        };
        dir.refresh(&snapshot);

        assert!(dir.group(stale).is_none());
        assert_eq!(dir.groups().len(), 2);
        assert_eq!(dir.ports().len(), 2);
        assert_eq!(dir.connections().len(), 1);
        let synth = dir.find_group_id("synth").unwrap();
        assert_eq!(dir.group(synth).and_then(|g| g.plugin), Some(PluginId(0)));
        assert!(synth.0 > stale.0);
    }

    #[test]
    fn test_positions() {
        let dir = TopologyDirectory::default();
        let g = dir.add_group_for("Reverb", Some(PluginId(2)));
        assert!(dir.positions().is_empty());

        let saved = GroupPosition::new("Old.1/Reverb", 5, 6, 7, 8).with_plugin(PluginId(2));
        assert_eq!(dir.restore_position(&saved, ""), Some(g));

        let positions = dir.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].name, "Reverb");
        assert_eq!(positions[0].plugin, Some(PluginId(2)));
        assert_eq!(positions[0].coordinates(), "5:6:7:8");

        let missing = GroupPosition::new("nobody", 0, 0, 0, 0);
        assert_eq!(dir.restore_position(&missing, ""), None);
    }

    #[test]
    fn test_group_and_port_lookup() {
        let dir = TopologyDirectory::default();
        let (a, _) = two_clients(&dir);
        assert_eq!(dir.group_and_port("synth:out_1"), Some((a.group, a.port)));
        assert_eq!(dir.group_and_port("synth:nope"), None);
        assert_eq!(dir.full_port_name(a.group, a.port).as_deref(), Some("synth:out_1"));
    }

    #[test]
    fn test_flags() {
        let flags = PortFlags::MIDI | PortFlags::IS_INPUT;
        assert!(flags.is_input());
        assert!(flags.contains(PortFlags::MIDI));
        assert!(!flags.contains(PortFlags::AUDIO));
        assert_eq!(PortFlags::from_bits(0xFF).bits(), 0x1F);
    }

    proptest::proptest! {
        #[test]
        fn prop_live_ids_are_unique_and_nonzero(ops in proptest::collection::vec(proptest::bool::ANY, 1..60)) {
            let dir = TopologyDirectory::default();
            let mut issued = std::collections::HashSet::new();
            for (i, add) in ops.into_iter().enumerate() {
                let live = dir.groups();
                if add || live.is_empty() {
                    let group = dir.add_group(&format!("client-{}", i));
                    proptest::prop_assert!(group.is_valid());
                    proptest::prop_assert!(issued.insert(group), "id {:?} issued twice", group);
                    let port = dir.add_port(group, "out", &format!("client-{}:out", i), audio_out());
                    proptest::prop_assert!(port.is_valid());
                } else {
                    proptest::prop_assert!(dir.remove_group(live[0].id));
                }
            }
            let ports = dir.ports();
            let unique: std::collections::HashSet<_> = ports.iter().map(|p| p.port).collect();
            proptest::prop_assert_eq!(unique.len(), ports.len());
        }
    }
}
