//! Per-plugin collection of named ports.
//!
//! A [`ClientPortRegistry`] owns every port of one plugin client in an arena
//! of generation-checked slots, and keeps six insertion-ordered name lists
//! (audio, CV and event; input and output). Names are unique across all six
//! lists: a colliding name gets a `" (N)"` suffix.

use crate::audio::AudioBlock;
use crate::cv::{CvMergeTiming, CvSourceMerger};
use crate::port::{CvSink, EventPort, Port, PortHandle, PortKind, PortMeta};

const LIST_COUNT: usize = 6;

/// List order used for lookups and name disambiguation.
const LIST_ORDER: [(PortKind, bool); LIST_COUNT] = [
    (PortKind::Audio, true),
    (PortKind::Audio, false),
    (PortKind::Cv, true),
    (PortKind::Cv, false),
    (PortKind::Event, true),
    (PortKind::Event, false),
];

#[inline]
fn list_index(kind: PortKind, is_input: bool) -> usize {
    match (kind, is_input) {
        (PortKind::Audio, true) => 0,
        (PortKind::Audio, false) => 1,
        (PortKind::Cv, true) => 2,
        (PortKind::Cv, false) => 3,
        (PortKind::Event, true) => 4,
        (PortKind::Event, false) => 5,
    }
}

#[derive(Debug)]
struct PortSlot {
    port: Option<Port>,
    generation: u32,
    alive: bool,
}

#[derive(Debug, Clone)]
struct ListEntry {
    name: String,
    handle: PortHandle,
}

/// Increment an existing `" (N)"` suffix (one or two digits), or append `" (2)"`.
pub fn bump_suffix(name: &mut String) {
    if let Some(body) = name.strip_suffix(')') {
        if let Some(open) = body.rfind(" (") {
            let digits = &body[open + 2..];
            if (1..=2).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = digits.parse::<u32>() {
                    name.truncate(open);
                    name.push_str(&format!(" ({})", n + 1));
                    return;
                }
            }
        }
    }
    name.push_str(" (2)");
}

/// Ports of one plugin client.
#[derive(Debug)]
pub struct ClientPortRegistry {
    name: String,
    max_frames: usize,
    slots: Vec<PortSlot>,
    free: Vec<u32>,
    lists: [Vec<ListEntry>; LIST_COUNT],
    active: bool,
    latency: u32,
    cv_sources: CvSourceMerger,
}

impl ClientPortRegistry {
    pub fn new(name: impl Into<String>, max_frames: usize) -> Self {
        Self::with_cv_timing(name, max_frames, CvMergeTiming::default())
    }

    pub fn with_cv_timing(name: impl Into<String>, max_frames: usize, timing: CvMergeTiming) -> Self {
        Self {
            name: name.into(),
            max_frames,
            slots: Vec::new(),
            free: Vec::new(),
            lists: Default::default(),
            active: false,
            latency: 0,
            cv_sources: CvSourceMerger::new(timing),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn set_latency(&mut self, latency: u32) {
        self.latency = latency;
    }

    // =========================================================================
    // Ports
    // =========================================================================

    /// Make `name` unique across all six lists.
    ///
    /// Each pass walks the lists in order and bumps the suffix on every hit.
    /// For ordinary names that single pass settles it. A bumped name can
    /// still match an entry the pass already went by (`"out (3)"` registered
    /// before `"out (2)"`), so passes repeat until one finds no collision.
    fn unique_name(&self, name: &str) -> String {
        let mut candidate = name.to_owned();
        loop {
            let mut bumped = false;
            for list in &self.lists {
                for entry in list {
                    if entry.name == candidate {
                        bump_suffix(&mut candidate);
                        bumped = true;
                    }
                }
            }
            if !bumped {
                return candidate;
            }
        }
    }

    /// Add a port tagged with its position in its list.
    pub fn add_port(&mut self, kind: PortKind, name: &str, is_input: bool) -> Option<PortHandle> {
        let index_offset = self.lists[list_index(kind, is_input)].len() as u32;
        self.add_port_with_offset(kind, name, is_input, index_offset)
    }

    /// Add a port with an explicit index offset. Fails on an empty name.
    pub fn add_port_with_offset(
        &mut self,
        kind: PortKind,
        name: &str,
        is_input: bool,
        index_offset: u32,
    ) -> Option<PortHandle> {
        if name.is_empty() {
            tracing::warn!("Client '{}': port name must not be empty", self.name);
            return None;
        }

        let name = self.unique_name(name);
        let meta = PortMeta {
            name: name.clone(),
            is_input,
            index_offset,
        };
        let port = Port::new(kind, meta, self.max_frames);

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.port = Some(port);
                slot.alive = true;
                PortHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(PortSlot {
                    port: Some(port),
                    generation: 0,
                    alive: true,
                });
                PortHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        self.lists[list_index(kind, is_input)].push(ListEntry { name, handle });
        Some(handle)
    }

    /// Remove the port named exactly `name`. Returns whether one existed.
    pub fn remove_port(&mut self, kind: PortKind, name: &str, is_input: bool) -> bool {
        let list = &mut self.lists[list_index(kind, is_input)];
        let Some(pos) = list.iter().position(|e| e.name == name) else {
            return false;
        };
        let entry = list.remove(pos);

        if kind == PortKind::Cv && is_input {
            if let Some(offset) = self.port(entry.handle).map(|p| p.index_offset()) {
                self.cv_sources.remove_source(offset);
            }
        }

        let slot = &mut self.slots[entry.handle.index as usize];
        slot.port = None;
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entry.handle.index);
        true
    }

    /// Remove every port.
    pub fn clear_ports(&mut self) {
        self.cv_sources.clear();
        for list in &mut self.lists {
            list.clear();
        }
        self.slots.clear();
        self.free.clear();
    }

    pub fn port_count(&self, kind: PortKind, is_input: bool) -> u32 {
        self.lists[list_index(kind, is_input)].len() as u32
    }

    pub fn port_name(&self, kind: PortKind, is_input: bool, index: u32) -> Option<&str> {
        self.lists[list_index(kind, is_input)]
            .get(index as usize)
            .map(|e| e.name.as_str())
    }

    /// All names of one list, in insertion order.
    pub fn port_names(&self, kind: PortKind, is_input: bool) -> impl Iterator<Item = &str> {
        self.lists[list_index(kind, is_input)]
            .iter()
            .map(|e| e.name.as_str())
    }

    pub fn handle_at(&self, kind: PortKind, is_input: bool, index: u32) -> Option<PortHandle> {
        self.lists[list_index(kind, is_input)]
            .get(index as usize)
            .map(|e| e.handle)
    }

    pub fn find(&self, kind: PortKind, name: &str, is_input: bool) -> Option<PortHandle> {
        self.lists[list_index(kind, is_input)]
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.handle)
    }

    /// Live port behind `handle`.
    pub fn port(&self, handle: PortHandle) -> Option<&Port> {
        let slot = self.slots.get(handle.index as usize)?;
        if !slot.alive || slot.generation != handle.generation {
            return None;
        }
        slot.port.as_ref()
    }

    pub fn port_mut(&mut self, handle: PortHandle) -> Option<&mut Port> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if !slot.alive || slot.generation != handle.generation {
            return None;
        }
        slot.port.as_mut()
    }

    pub fn is_alive(&self, handle: PortHandle) -> bool {
        self.port(handle).is_some()
    }

    /// Mark one port dead; its name stays registered.
    pub fn invalidate_port(&mut self, handle: PortHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation {
                slot.alive = false;
            }
        }
    }

    /// Mark every port dead, e.g. after the server connection is lost.
    pub fn invalidate_all(&mut self) {
        for slot in &mut self.slots {
            slot.alive = false;
        }
    }

    /// Bind every live port to a block of `frames`.
    pub fn init_buffers(&mut self, frames: usize) {
        for slot in &mut self.slots {
            if !slot.alive {
                continue;
            }
            if let Some(port) = slot.port.as_mut() {
                port.init_buffer(frames);
            }
        }
    }

    fn first_event_port(&self, is_input: bool) -> Option<&EventPort> {
        self.lists[list_index(PortKind::Event, is_input)]
            .iter()
            .find_map(|e| self.port(e.handle))
            .and_then(Port::as_event)
    }

    fn first_event_port_mut(&mut self, is_input: bool) -> Option<&mut EventPort> {
        let handle = self.lists[list_index(PortKind::Event, is_input)]
            .iter()
            .map(|e| e.handle)
            .find(|&h| self.is_alive(h))?;
        self.port_mut(handle).and_then(Port::as_event_mut)
    }

    /// First live event input.
    pub fn default_event_in(&self) -> Option<&EventPort> {
        self.first_event_port(true)
    }

    pub fn default_event_in_mut(&mut self) -> Option<&mut EventPort> {
        self.first_event_port_mut(true)
    }

    /// First live event output.
    pub fn default_event_out(&self) -> Option<&EventPort> {
        self.first_event_port(false)
    }

    pub fn default_event_out_mut(&mut self) -> Option<&mut EventPort> {
        self.first_event_port_mut(false)
    }

    // =========================================================================
    // CV sources
    // =========================================================================

    pub fn cv_sources(&self) -> &CvSourceMerger {
        &self.cv_sources
    }

    /// Use the CV input behind `handle` as a parameter source.
    pub fn add_cv_source(&mut self, handle: PortHandle, index_offset: u32, reconfigure_now: bool) -> bool {
        let Some(port) = self.port(handle).and_then(Port::as_cv) else {
            tracing::warn!("Client '{}': CV source port is missing", self.name);
            return false;
        };
        self.cv_sources.add_source(port, index_offset, reconfigure_now)
    }

    pub fn remove_cv_source(&mut self, index_offset: u32) -> bool {
        self.cv_sources.remove_source(index_offset)
    }

    /// Set a CV port's range; sources reading the port follow it.
    pub fn set_cv_range(&mut self, handle: PortHandle, min: f32, max: f32) -> bool {
        match self.port_mut(handle).and_then(Port::as_cv_mut) {
            Some(port) => {
                port.set_range(min, max);
                port.range() == (min, max)
            }
            None => false,
        }
    }

    /// Merge CV source values from `buffers` into the default event input.
    pub fn merge_cv_sources(&mut self, buffers: &AudioBlock, first_channel: usize, frames: usize) -> usize {
        let handle = self.lists[list_index(PortKind::Event, true)]
            .iter()
            .map(|e| e.handle)
            .find(|&h| self.is_alive(h));
        let Some(handle) = handle else {
            return 0;
        };

        let cv_sources = &self.cv_sources;
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return 0;
        };
        match slot.port.as_mut().and_then(Port::as_event_mut) {
            Some(port) => cv_sources.merge_into(buffers, first_channel, frames, port.buffer_mut()),
            None => 0,
        }
    }

    /// Visit every (kind, is_input, name) in list order.
    pub fn for_each_name(&self, mut f: impl FnMut(PortKind, bool, &str)) {
        for (i, (kind, is_input)) in LIST_ORDER.iter().enumerate() {
            for entry in &self.lists[i] {
                f(*kind, *is_input, &entry.name);
            }
        }
    }
}
