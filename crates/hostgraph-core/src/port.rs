//! Audio, CV and event ports.
//!
//! Each port kind is its own type; [`Port`] is the closed set of them.
//! Capabilities are expressed as traits ([`AudioSink`], [`CvSink`],
//! [`EventSink`]) so code that only needs one capability can stay generic.
//!
//! Ports are owned by a [`ClientPortRegistry`](crate::ClientPortRegistry) and
//! referenced elsewhere through a [`PortHandle`].

use crate::compat::Arc;
use crate::event::{
    decode_control, ControlEvent, ControlKind, EngineEvent, EventBuffer, MAX_PARAMETER_INDEX,
    MIDI_CHANNEL_COUNT,
};
use crate::lockfree::AtomicFloat;

static FALLBACK_EVENT: EngineEvent = EngineEvent::NULL;

/// Port data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Audio,
    Cv,
    Event,
}

/// Generation-checked reference to a port slot inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Metadata shared by every port kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMeta {
    pub name: String,
    pub is_input: bool,
    /// Stable small integer used to tag events originating from this port.
    pub index_offset: u32,
}

/// Access to a per-block sample buffer.
pub trait AudioSink {
    /// Bind the buffer for a block of `frames`. Outputs are zero-filled.
    fn init_buffer(&mut self, frames: usize);
    fn buffer(&self) -> &[f32];
    fn buffer_mut(&mut self) -> &mut [f32];
}

/// An audio-rate control signal with a normalization range.
pub trait CvSink: AudioSink {
    fn set_range(&mut self, min: f32, max: f32);
    fn range(&self) -> (f32, f32);
}

/// Access to a per-block event buffer.
pub trait EventSink {
    /// Number of events (input ports only).
    fn event_count(&self) -> u32;
    /// Event at `index`, or a null fallback event on any precondition failure.
    fn event(&self, index: u32) -> &EngineEvent;
    fn write_control_event(
        &mut self,
        time: u32,
        channel: u8,
        kind: ControlKind,
        param: u16,
        midi_value: i8,
        normalized: f32,
    ) -> bool;
    fn write_midi_event(&mut self, time: u32, channel: u8, data: &[u8]) -> bool;
}

/// Sample storage sized once for the largest block.
#[derive(Debug)]
struct SampleBuffer {
    samples: Vec<f32>,
    frames: usize,
}

impl SampleBuffer {
    fn new(max_frames: usize) -> Self {
        Self {
            samples: vec![0.0; max_frames],
            frames: 0,
        }
    }

    fn init(&mut self, frames: usize, zero: bool, name: &str) {
        if frames > self.samples.len() {
            tracing::warn!(
                "Port '{}': block of {} frames exceeds capacity {}",
                name,
                frames,
                self.samples.len()
            );
        }
        self.frames = frames.min(self.samples.len());
        if zero {
            self.samples[..self.frames].fill(0.0);
        }
    }
}

#[derive(Debug)]
pub struct AudioPort {
    meta: PortMeta,
    buffer: SampleBuffer,
}

impl AudioPort {
    pub fn new(meta: PortMeta, max_frames: usize) -> Self {
        Self {
            meta,
            buffer: SampleBuffer::new(max_frames),
        }
    }

    pub fn meta(&self) -> &PortMeta {
        &self.meta
    }
}

impl AudioSink for AudioPort {
    fn init_buffer(&mut self, frames: usize) {
        self.buffer.init(frames, !self.meta.is_input, &self.meta.name);
    }

    fn buffer(&self) -> &[f32] {
        &self.buffer.samples[..self.buffer.frames]
    }

    fn buffer_mut(&mut self) -> &mut [f32] {
        &mut self.buffer.samples[..self.buffer.frames]
    }
}

/// Normalization range of a CV port, shared with CV sources reading it.
#[derive(Debug)]
pub struct CvRange {
    min: AtomicFloat,
    max: AtomicFloat,
}

impl CvRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min: AtomicFloat::new(min),
            max: AtomicFloat::new(max),
        }
    }

    pub fn get(&self) -> (f32, f32) {
        (self.min.get(), self.max.get())
    }

    fn set(&self, min: f32, max: f32) {
        self.min.set(min);
        self.max.set(max);
    }

    /// Map `value` into [0, 1]. A degenerate range maps everything to 0.
    pub fn normalize(&self, value: f32) -> f32 {
        let (min, max) = self.get();
        if max <= min {
            return 0.0;
        }
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

impl Default for CvRange {
    fn default() -> Self {
        Self::new(-1.0, 1.0)
    }
}

#[derive(Debug)]
pub struct CvPort {
    meta: PortMeta,
    buffer: SampleBuffer,
    range: Arc<CvRange>,
}

impl CvPort {
    pub fn new(meta: PortMeta, max_frames: usize) -> Self {
        Self {
            meta,
            buffer: SampleBuffer::new(max_frames),
            range: Arc::new(CvRange::default()),
        }
    }

    pub fn meta(&self) -> &PortMeta {
        &self.meta
    }

    /// Shared handle to this port's range.
    pub fn range_handle(&self) -> Arc<CvRange> {
        Arc::clone(&self.range)
    }
}

impl AudioSink for CvPort {
    fn init_buffer(&mut self, frames: usize) {
        self.buffer.init(frames, !self.meta.is_input, &self.meta.name);
    }

    fn buffer(&self) -> &[f32] {
        &self.buffer.samples[..self.buffer.frames]
    }

    fn buffer_mut(&mut self) -> &mut [f32] {
        &mut self.buffer.samples[..self.buffer.frames]
    }
}

impl CvSink for CvPort {
    fn set_range(&mut self, min: f32, max: f32) {
        if min.is_nan() || max.is_nan() || min >= max {
            tracing::warn!("CV port '{}': invalid range [{}, {}]", self.meta.name, min, max);
            return;
        }
        self.range.set(min, max);
    }

    fn range(&self) -> (f32, f32) {
        self.range.get()
    }
}

#[derive(Debug)]
pub struct EventPort {
    meta: PortMeta,
    buffer: EventBuffer,
    /// Frames of the current block; 0 until the first `init_buffer`.
    frames: usize,
}

impl EventPort {
    pub fn new(meta: PortMeta) -> Self {
        Self {
            meta,
            buffer: EventBuffer::new(),
            frames: 0,
        }
    }

    pub fn meta(&self) -> &PortMeta {
        &self.meta
    }

    /// Zero the buffer for a new block of `frames`.
    pub fn init_buffer(&mut self, frames: usize) {
        self.buffer.clear();
        self.frames = frames;
    }

    /// Host-side view of the buffer, regardless of direction.
    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Host-side access used to fill inputs and drain outputs.
    pub fn buffer_mut(&mut self) -> &mut EventBuffer {
        &mut self.buffer
    }

    fn check_write(&self, time: u32, channel: u8) -> bool {
        if self.meta.is_input {
            tracing::warn!("Event port '{}': write on an input port", self.meta.name);
            return false;
        }
        if channel >= MIDI_CHANNEL_COUNT {
            tracing::warn!("Event port '{}': invalid channel {}", self.meta.name, channel);
            return false;
        }
        if self.frames == 0 {
            tracing::warn!("Event port '{}': buffer not initialized", self.meta.name);
            return false;
        }
        if time as usize >= self.frames {
            tracing::warn!(
                "Event port '{}': time {} outside block of {} frames",
                self.meta.name,
                time,
                self.frames
            );
            return false;
        }
        true
    }

    fn push_checked(&mut self, event: EngineEvent) -> bool {
        if self.buffer.push(event) {
            return true;
        }
        tracing::warn!("Event port '{}': buffer full", self.meta.name);
        false
    }
}

impl EventSink for EventPort {
    fn event_count(&self) -> u32 {
        if !self.meta.is_input {
            tracing::warn!("Event port '{}': event count on an output port", self.meta.name);
            return 0;
        }
        self.buffer.len() as u32
    }

    fn event(&self, index: u32) -> &EngineEvent {
        if !self.meta.is_input {
            tracing::warn!("Event port '{}': read on an output port", self.meta.name);
            return &FALLBACK_EVENT;
        }
        self.buffer.slot(index as usize).unwrap_or(&FALLBACK_EVENT)
    }

    fn write_control_event(
        &mut self,
        time: u32,
        channel: u8,
        kind: ControlKind,
        param: u16,
        midi_value: i8,
        normalized: f32,
    ) -> bool {
        if !self.check_write(time, channel) {
            return false;
        }
        if param > MAX_PARAMETER_INDEX {
            tracing::warn!("Event port '{}': parameter {} out of range", self.meta.name, param);
            return false;
        }
        let ctrl = ControlEvent {
            kind,
            param,
            midi_value,
            normalized: normalized.clamp(0.0, 1.0),
        };
        self.push_checked(EngineEvent::control(time, channel, ctrl))
    }

    fn write_midi_event(&mut self, time: u32, channel: u8, data: &[u8]) -> bool {
        if !self.check_write(time, channel) {
            return false;
        }
        let Some(&status_byte) = data.first() else {
            tracing::warn!("Event port '{}': empty MIDI message", self.meta.name);
            return false;
        };

        let status = if status_byte < 0xF0 {
            status_byte & 0xF0
        } else {
            status_byte
        };
        if let Some(ctrl) = decode_control(status, data) {
            if ctrl.kind != ControlKind::Parameter {
                return self.push_checked(EngineEvent::control(time, channel, ctrl));
            }
        }

        let port = if self.meta.index_offset < 0xFF {
            self.meta.index_offset as u8
        } else {
            tracing::warn!(
                "Event port '{}': index offset {} does not fit a MIDI port",
                self.meta.name,
                self.meta.index_offset
            );
            0
        };

        let mut bytes = [0u8; 4];
        let message: &[u8] = if data.len() <= bytes.len() {
            bytes[..data.len()].copy_from_slice(data);
            bytes[0] = status;
            &bytes[..data.len()]
        } else {
            data
        };
        if self.buffer.push_midi(time, channel, port, message) {
            return true;
        }
        tracing::warn!("Event port '{}': buffer full", self.meta.name);
        false
    }
}

/// A port of any kind.
#[derive(Debug)]
pub enum Port {
    Audio(AudioPort),
    Cv(CvPort),
    Event(EventPort),
}

impl Port {
    pub fn new(kind: PortKind, meta: PortMeta, max_frames: usize) -> Self {
        match kind {
            PortKind::Audio => Port::Audio(AudioPort::new(meta, max_frames)),
            PortKind::Cv => Port::Cv(CvPort::new(meta, max_frames)),
            PortKind::Event => Port::Event(EventPort::new(meta)),
        }
    }

    pub fn kind(&self) -> PortKind {
        match self {
            Port::Audio(_) => PortKind::Audio,
            Port::Cv(_) => PortKind::Cv,
            Port::Event(_) => PortKind::Event,
        }
    }

    pub fn meta(&self) -> &PortMeta {
        match self {
            Port::Audio(p) => &p.meta,
            Port::Cv(p) => &p.meta,
            Port::Event(p) => &p.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn is_input(&self) -> bool {
        self.meta().is_input
    }

    pub fn index_offset(&self) -> u32 {
        self.meta().index_offset
    }

    pub fn init_buffer(&mut self, frames: usize) {
        match self {
            Port::Audio(p) => p.init_buffer(frames),
            Port::Cv(p) => p.init_buffer(frames),
            Port::Event(p) => p.init_buffer(frames),
        }
    }

    pub fn as_audio(&self) -> Option<&AudioPort> {
        match self {
            Port::Audio(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_audio_mut(&mut self) -> Option<&mut AudioPort> {
        match self {
            Port::Audio(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_cv(&self) -> Option<&CvPort> {
        match self {
            Port::Cv(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_cv_mut(&mut self) -> Option<&mut CvPort> {
        match self {
            Port::Cv(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventPort> {
        match self {
            Port::Event(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_event_mut(&mut self) -> Option<&mut EventPort> {
        match self {
            Port::Event(p) => Some(p),
            _ => None,
        }
    }
}
