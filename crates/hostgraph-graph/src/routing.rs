//! Connection table read by the audio thread.
//!
//! Every patchbay port the graph owns maps to an [`Endpoint`]. Connections
//! are resolved to endpoint pairs on the control thread and published as an
//! immutable [`LinkTable`]; the audio thread loads the current table once per
//! block and walks it to pull its inputs.

use hostgraph_core::{PluginId, PortKind};
use hostgraph_patchbay::{ConnectionId, PortFlags, PortId};

/// Where a graph port reads or writes its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// Server capture channel.
    AudioIn(usize),
    /// Server playback channel.
    AudioOut(usize),
    CvIn(usize),
    CvOut(usize),
    MidiIn,
    MidiOut,
    /// Rack input channel (0 or 1).
    RackIn(usize),
    RackOut(usize),
    RackMidiIn,
    RackMidiOut,
    Plugin {
        id: PluginId,
        kind: PortKind,
        index: usize,
        is_input: bool,
    },
}

impl Endpoint {
    /// True for endpoints that produce data (connection sources).
    pub(crate) fn is_source(&self) -> bool {
        match *self {
            Endpoint::AudioIn(_)
            | Endpoint::CvIn(_)
            | Endpoint::MidiIn
            | Endpoint::RackOut(_)
            | Endpoint::RackMidiOut => true,
            Endpoint::Plugin { is_input, .. } => !is_input,
            _ => false,
        }
    }

    pub(crate) fn kind(&self) -> PortKind {
        match *self {
            Endpoint::AudioIn(_) | Endpoint::AudioOut(_) | Endpoint::RackIn(_) | Endpoint::RackOut(_) => {
                PortKind::Audio
            }
            Endpoint::CvIn(_) | Endpoint::CvOut(_) => PortKind::Cv,
            Endpoint::MidiIn | Endpoint::MidiOut | Endpoint::RackMidiIn | Endpoint::RackMidiOut => {
                PortKind::Event
            }
            Endpoint::Plugin { kind, .. } => kind,
        }
    }

    pub(crate) fn plugin(&self) -> Option<PluginId> {
        match *self {
            Endpoint::Plugin { id, .. } => Some(id),
            _ => None,
        }
    }

    fn is_rack(&self) -> bool {
        matches!(
            self,
            Endpoint::RackIn(_) | Endpoint::RackOut(_) | Endpoint::RackMidiIn | Endpoint::RackMidiOut
        )
    }

    /// Patchbay flags of a port at this endpoint.
    pub(crate) fn flags(&self) -> PortFlags {
        let kind = match self.kind() {
            PortKind::Audio => PortFlags::AUDIO,
            PortKind::Cv => PortFlags::CV,
            PortKind::Event => PortFlags::MIDI,
        };
        if self.is_source() {
            kind
        } else {
            kind | PortFlags::IS_INPUT
        }
    }
}

/// Why two endpoints cannot be connected, if they cannot.
pub(crate) fn check_pair(source: Endpoint, target: Endpoint, rack: bool) -> Result<(), &'static str> {
    if !source.is_source() {
        return Err("source port is not an output");
    }
    if target.is_source() {
        return Err("target port is not an input");
    }
    if source.kind() != target.kind() {
        return Err("port types differ");
    }
    if rack && source.is_rack() == target.is_rack() {
        return Err("rack connections must join the rack and a server port");
    }
    Ok(())
}

/// One resolved connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub connection: ConnectionId,
    pub source_port: PortId,
    pub target_port: PortId,
    pub source: Endpoint,
    pub target: Endpoint,
}

impl Link {
    pub(crate) fn touches_plugin(&self, id: PluginId) -> bool {
        self.source.plugin() == Some(id) || self.target.plugin() == Some(id)
    }
}

/// Immutable snapshot of every resolved connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct LinkTable {
    links: Vec<Link>,
}

impl LinkTable {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Sources feeding `target`.
    #[inline]
    pub(crate) fn sources_of(&self, target: Endpoint) -> impl Iterator<Item = Endpoint> + '_ {
        self.links
            .iter()
            .filter(move |l| l.target == target)
            .map(|l| l.source)
    }

    pub(crate) fn with(&self, link: Link) -> Self {
        let mut links = Vec::with_capacity(self.links.len() + 1);
        links.extend_from_slice(&self.links);
        links.push(link);
        Self { links }
    }

    pub(crate) fn without(&self, mut remove: impl FnMut(&Link) -> bool) -> Self {
        Self {
            links: self.links.iter().filter(|l| !remove(l)).copied().collect(),
        }
    }

    /// Point every link ending at `port` to `target`.
    pub(crate) fn retarget(&self, port: PortId, target: Endpoint) -> Self {
        Self {
            links: self
                .links
                .iter()
                .map(|l| if l.target_port == port { Link { target, ..*l } } else { *l })
                .collect(),
        }
    }
}

impl From<Vec<Link>> for LinkTable {
    fn from(links: Vec<Link>) -> Self {
        Self { links }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(index: usize, is_input: bool) -> Endpoint {
        Endpoint::Plugin {
            id: PluginId(1),
            kind: PortKind::Audio,
            index,
            is_input,
        }
    }

    #[test]
    fn test_direction_and_flags() {
        assert!(Endpoint::AudioIn(0).is_source());
        assert!(!Endpoint::AudioOut(0).is_source());
        assert!(plugin(0, false).is_source());
        assert_eq!(Endpoint::MidiOut.flags(), PortFlags::MIDI | PortFlags::IS_INPUT);
        assert_eq!(Endpoint::RackOut(1).flags(), PortFlags::AUDIO);
    }

    #[test]
    fn test_check_pair() {
        assert!(check_pair(Endpoint::AudioIn(0), plugin(0, true), false).is_ok());
        assert!(check_pair(plugin(0, true), Endpoint::AudioOut(0), false).is_err());
        assert!(check_pair(Endpoint::MidiIn, plugin(0, true), false).is_err());
        assert!(check_pair(Endpoint::AudioIn(0), Endpoint::RackIn(0), true).is_ok());
        // server to server is not a rack connection
        assert!(check_pair(Endpoint::AudioIn(0), Endpoint::AudioOut(0), true).is_err());
    }

    #[test]
    fn test_table_edits() {
        let link = Link {
            connection: ConnectionId(1),
            source_port: PortId(1),
            target_port: PortId(2),
            source: Endpoint::AudioIn(0),
            target: plugin(0, true),
        };
        let table = LinkTable::default().with(link);
        assert_eq!(table.len(), 1);
        assert_eq!(table.sources_of(plugin(0, true)).count(), 1);
        assert!(table.iter().all(|l| l.touches_plugin(PluginId(1))));

        let table = table.retarget(PortId(2), plugin(1, true));
        assert_eq!(table.sources_of(plugin(0, true)).count(), 0);
        assert_eq!(table.sources_of(plugin(1, true)).count(), 1);
        assert_eq!(table.retarget(PortId(9), plugin(0, true)).sources_of(plugin(1, true)).count(), 1);

        let table = table.without(|l| l.connection == ConnectionId(1));
        assert_eq!(table.len(), 0);
    }
}
