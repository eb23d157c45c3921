//! Fixed-capacity event buffers exchanged on event ports.
//!
//! An [`EventBuffer`] holds up to [`MAX_EVENT_COUNT`] [`EngineEvent`]s for one
//! audio block, kept in ascending time order. Unused slots hold
//! [`EngineEvent::NULL`], so the first null slot terminates the buffer.
//!
//! # RT Safety
//!
//! All storage is allocated up front. Pushing, clearing, and reading never
//! allocate; a full buffer rejects further events instead of growing.

/// Slots per event buffer.
pub const MAX_EVENT_COUNT: usize = 512;

/// Number of MIDI channels.
pub const MIDI_CHANNEL_COUNT: u8 = 16;

/// Channel used by events that do not originate from a MIDI channel (e.g. CV).
pub const NON_MIDI_CHANNEL: u8 = 0x30;

/// Largest parameter index a control event can carry (14-bit).
pub const MAX_PARAMETER_INDEX: u16 = 16383;

/// Largest MIDI message stored inline in an event.
pub const INLINE_MIDI_SIZE: usize = 4;

/// Bytes reserved per buffer for messages larger than [`INLINE_MIDI_SIZE`].
pub const SYSEX_POOL_SIZE: usize = 4096;

pub(crate) const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub(crate) const STATUS_PROGRAM_CHANGE: u8 = 0xC0;
pub(crate) const CC_BANK_SELECT: u8 = 0x00;
pub(crate) const CC_BANK_SELECT_LSB: u8 = 0x20;
pub(crate) const CC_ALL_SOUND_OFF: u8 = 0x78;
pub(crate) const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// Kind of a control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Parameter,
    MidiBank,
    MidiProgram,
    AllSoundOff,
    AllNotesOff,
}

/// Control payload: parameter change, bank/program change, or a panic message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlEvent {
    pub kind: ControlKind,
    pub param: u16,
    /// Raw MIDI value (0-127), or -1 when the event did not come from MIDI.
    pub midi_value: i8,
    /// Value in [0, 1].
    pub normalized: f32,
}

impl ControlEvent {
    pub fn parameter(param: u16, normalized: f32) -> Self {
        Self {
            kind: ControlKind::Parameter,
            param,
            midi_value: -1,
            normalized: normalized.clamp(0.0, 1.0),
        }
    }

    fn message(kind: ControlKind, param: u16) -> Self {
        Self {
            kind,
            param,
            midi_value: -1,
            normalized: 0.0,
        }
    }

    /// Encode as a raw MIDI message on `channel`.
    ///
    /// Returns the bytes and their length, or `None` for parameters that have
    /// no MIDI controller equivalent (index ≥ 128).
    pub fn to_midi_data(&self, channel: u8) -> Option<([u8; 3], usize)> {
        let channel = channel & 0x0F;
        let cc = STATUS_CONTROL_CHANGE | channel;
        match self.kind {
            ControlKind::Parameter => {
                if self.param >= 128 {
                    return None;
                }
                let value = if self.midi_value >= 0 {
                    self.midi_value as u8
                } else {
                    (self.normalized.clamp(0.0, 1.0) * 127.0).round() as u8
                };
                Some(([cc, self.param as u8, value], 3))
            }
            ControlKind::MidiBank => Some(([cc, CC_BANK_SELECT, self.param.min(127) as u8], 3)),
            ControlKind::MidiProgram => Some((
                [STATUS_PROGRAM_CHANGE | channel, self.param.min(127) as u8, 0],
                2,
            )),
            ControlKind::AllSoundOff => Some(([cc, CC_ALL_SOUND_OFF, 0], 3)),
            ControlKind::AllNotesOff => Some(([cc, CC_ALL_NOTES_OFF, 0], 3)),
        }
    }
}

/// Location of a large MIDI message inside its buffer's byte pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysexRange {
    offset: u32,
    len: u32,
}

/// MIDI payload.
///
/// Messages up to [`INLINE_MIDI_SIZE`] bytes live inline. Larger ones live in
/// the owning [`EventBuffer`]'s pool; read them through
/// [`EventBuffer::midi_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiData {
    /// Index offset of the originating port.
    pub port: u8,
    size: u8,
    data: [u8; INLINE_MIDI_SIZE],
    ext: Option<SysexRange>,
}

impl MidiData {
    /// Inline message. Returns `None` when `bytes` is empty or too large.
    pub fn inline(port: u8, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > INLINE_MIDI_SIZE {
            return None;
        }
        let mut data = [0u8; INLINE_MIDI_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            port,
            size: bytes.len() as u8,
            data,
            ext: None,
        })
    }

    pub fn size(&self) -> usize {
        match self.ext {
            Some(range) => range.len as usize,
            None => self.size as usize,
        }
    }

    pub fn is_external(&self) -> bool {
        self.ext.is_some()
    }

    /// Inline bytes; empty for pooled messages.
    pub fn inline_bytes(&self) -> &[u8] {
        match self.ext {
            Some(_) => &[],
            None => &self.data[..self.size as usize],
        }
    }
}

/// Event payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EventData {
    #[default]
    Null,
    Control(ControlEvent),
    Midi(MidiData),
}

/// Payload discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Null,
    Control,
    Midi,
}

/// One event inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineEvent {
    /// Frames since block start.
    pub time: u32,
    /// MIDI channel (0-15) or [`NON_MIDI_CHANNEL`].
    pub channel: u8,
    pub data: EventData,
}

impl EngineEvent {
    pub const NULL: EngineEvent = EngineEvent {
        time: 0,
        channel: 0,
        data: EventData::Null,
    };

    pub fn control(time: u32, channel: u8, ctrl: ControlEvent) -> Self {
        Self {
            time,
            channel,
            data: EventData::Control(ctrl),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.data {
            EventData::Null => EventKind::Null,
            EventData::Control(_) => EventKind::Control,
            EventData::Midi(_) => EventKind::Midi,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self.data, EventData::Null)
    }

    pub fn as_control(&self) -> Option<&ControlEvent> {
        match &self.data {
            EventData::Control(ctrl) => Some(ctrl),
            _ => None,
        }
    }

    pub fn as_midi(&self) -> Option<&MidiData> {
        match &self.data {
            EventData::Midi(midi) => Some(midi),
            _ => None,
        }
    }

    /// Decode a raw MIDI message of at most [`INLINE_MIDI_SIZE`] bytes.
    ///
    /// Bank select, program change, all-sound-off and all-notes-off become
    /// control events, other controllers become `Parameter` controls, and the
    /// rest stays MIDI with the channel stripped from the status byte.
    pub fn from_midi_data(time: u32, port: u8, bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        if status < 0xF0 {
            let channel = status & 0x0F;
            if let Some(ctrl) = decode_control(status & 0xF0, bytes) {
                return Some(Self::control(time, channel, ctrl));
            }
            let mut midi = MidiData::inline(port, bytes)?;
            midi.data[0] = status & 0xF0;
            return Some(Self {
                time,
                channel,
                data: EventData::Midi(midi),
            });
        }
        Some(Self {
            time,
            channel: 0,
            data: EventData::Midi(MidiData::inline(port, bytes)?),
        })
    }
}

/// Map a channel-stripped status plus data bytes to a control event.
pub(crate) fn decode_control(status: u8, bytes: &[u8]) -> Option<ControlEvent> {
    match status {
        STATUS_CONTROL_CHANGE if bytes.len() >= 3 => {
            let controller = bytes[1];
            Some(match controller {
                CC_BANK_SELECT | CC_BANK_SELECT_LSB => {
                    ControlEvent::message(ControlKind::MidiBank, bytes[2] as u16)
                }
                CC_ALL_SOUND_OFF => ControlEvent::message(ControlKind::AllSoundOff, 0),
                CC_ALL_NOTES_OFF => ControlEvent::message(ControlKind::AllNotesOff, 0),
                _ => {
                    let value = bytes[2].min(127);
                    ControlEvent {
                        kind: ControlKind::Parameter,
                        param: controller as u16,
                        midi_value: value as i8,
                        normalized: value as f32 / 127.0,
                    }
                }
            })
        }
        STATUS_PROGRAM_CHANGE if bytes.len() >= 2 => Some(ControlEvent::message(
            ControlKind::MidiProgram,
            bytes[1] as u16,
        )),
        _ => None,
    }
}

/// Per-block event storage.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: Box<[EngineEvent]>,
    count: usize,
    sysex: Vec<u8>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENT_COUNT)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: vec![EngineEvent::NULL; capacity].into_boxed_slice(),
            count: 0,
            sysex: Vec::with_capacity(SYSEX_POOL_SIZE),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Number of events before the first null slot.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.events.len()
    }

    /// Reset every used slot to null. Does not allocate.
    pub fn clear(&mut self) {
        for event in &mut self.events[..self.count] {
            *event = EngineEvent::NULL;
        }
        self.count = 0;
        self.sysex.clear();
    }

    /// Event at `index` if it is below the current count.
    pub fn get(&self, index: usize) -> Option<&EngineEvent> {
        self.events[..self.count].get(index)
    }

    /// Raw slot at `index`, which may be a null slot past the count.
    pub fn slot(&self, index: usize) -> Option<&EngineEvent> {
        self.events.get(index)
    }

    pub fn last(&self) -> Option<&EngineEvent> {
        self.events[..self.count].last()
    }

    pub fn as_slice(&self) -> &[EngineEvent] {
        &self.events[..self.count]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        self.as_slice().iter()
    }

    /// Insert keeping ascending time order; equal times keep write order.
    ///
    /// Returns `false` for null events or when the buffer is full.
    pub fn push(&mut self, event: EngineEvent) -> bool {
        if event.is_null() || self.is_full() {
            return false;
        }
        let mut pos = self.count;
        while pos > 0 && self.events[pos - 1].time > event.time {
            pos -= 1;
        }
        self.insert_unchecked(pos, event);
        true
    }

    /// Insert at a fixed position. The caller keeps the time ordering.
    pub(crate) fn insert(&mut self, pos: usize, event: EngineEvent) -> bool {
        if event.is_null() || self.is_full() || pos > self.count {
            return false;
        }
        self.insert_unchecked(pos, event);
        true
    }

    fn insert_unchecked(&mut self, pos: usize, event: EngineEvent) {
        self.events.copy_within(pos..self.count, pos + 1);
        self.events[pos] = event;
        self.count += 1;
    }

    /// Store a raw MIDI message of any size.
    ///
    /// Messages above [`INLINE_MIDI_SIZE`] bytes go to the byte pool; a
    /// message that no longer fits there is rejected.
    pub fn push_midi(&mut self, time: u32, channel: u8, port: u8, bytes: &[u8]) -> bool {
        if bytes.len() <= INLINE_MIDI_SIZE {
            let Some(midi) = MidiData::inline(port, bytes) else {
                return false;
            };
            return self.push(EngineEvent {
                time,
                channel,
                data: EventData::Midi(midi),
            });
        }
        if self.is_full() || self.sysex.len() + bytes.len() > SYSEX_POOL_SIZE {
            tracing::warn!("EventBuffer: sysex pool full, dropping {} bytes", bytes.len());
            return false;
        }
        let offset = self.sysex.len();
        self.sysex.extend_from_slice(bytes);
        let midi = MidiData {
            port,
            size: 0,
            data: [0; INLINE_MIDI_SIZE],
            ext: Some(SysexRange {
                offset: offset as u32,
                len: bytes.len() as u32,
            }),
        };
        self.push(EngineEvent {
            time,
            channel,
            data: EventData::Midi(midi),
        })
    }

    /// Bytes of a MIDI payload stored in this buffer.
    pub fn midi_bytes<'a>(&'a self, midi: &'a MidiData) -> &'a [u8] {
        match midi.ext {
            Some(range) => {
                let start = range.offset as usize;
                self.sysex
                    .get(start..start + range.len as usize)
                    .unwrap_or(&[])
            }
            None => midi.inline_bytes(),
        }
    }

    /// Replace the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &EventBuffer) {
        self.clear();
        for event in other.iter() {
            if !self.push_from(other, event) {
                break;
            }
        }
    }

    /// Merge events of `other` into this buffer in time order.
    ///
    /// Returns the number of events taken; the rest are dropped once full.
    pub fn merge_from(&mut self, other: &EventBuffer) -> usize {
        let mut merged = 0;
        for event in other.iter() {
            if !self.push_from(other, event) {
                break;
            }
            merged += 1;
        }
        merged
    }

    fn push_from(&mut self, source: &EventBuffer, event: &EngineEvent) -> bool {
        match &event.data {
            EventData::Midi(midi) if midi.is_external() => {
                let bytes = source.midi_bytes(midi);
                self.push_midi(event.time, event.channel, midi.port, bytes)
            }
            _ => self.push(*event),
        }
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}
