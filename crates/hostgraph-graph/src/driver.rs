//! Audio-server facing block driver.
//!
//! The [`AudioCallbackDriver`] lives on the audio thread and is called once
//! per server callback. It owns the server-side buffers, runs pending control
//! actions, queries the transport, hands the block to the [`RoutingGraph`]
//! and publishes statistics. Other threads talk to it through a cloneable
//! [`DriverHandle`].
//!
//! Nothing in [`AudioCallbackDriver::on_block`] allocates or blocks.

use crate::graph::{BlockStatus, ProcessBuffers, RoutingGraph};
use crate::node::block_peaks;
use crossbeam::queue::ArrayQueue;
use hostgraph_core::compat::{Arc, AtomicU64, Ordering};
use hostgraph_core::{
    AtomicFlag, AudioBlock, ControlEvent, ControlKind, EngineEvent, EventBuffer, PeakLevels,
    MIDI_CHANNEL_COUNT,
};
use hostgraph_patchbay::{TransportInfo, TransportSource};

const ACTION_QUEUE_SIZE: usize = 64;

/// Requests from the control thread, run at the start of the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    /// Forget the held master peaks.
    ResetPeaks,
    /// Send all-notes-off on every MIDI channel into the next block.
    AllNotesOff,
}

/// Block counters and master peaks, written by the audio thread.
#[derive(Debug, Default)]
pub struct DriverStats {
    blocks_processed: AtomicU64,
    blocks_skipped: AtomicU64,
    frames_processed: AtomicU64,
    plugins_skipped: AtomicU64,
    peaks: PeakLevels,
}

impl DriverStats {
    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    /// Blocks the graph could not run (not ready, runner parked, or busy).
    pub fn blocks_skipped(&self) -> u64 {
        self.blocks_skipped.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Plugin runs skipped inside processed blocks.
    pub fn plugins_skipped(&self) -> u64 {
        self.plugins_skipped.load(Ordering::Relaxed)
    }

    /// Held `(inputs, outputs)` peaks since the last reset.
    pub fn master_peaks(&self) -> ([f32; 2], [f32; 2]) {
        self.peaks.get()
    }
}

/// Last transport state seen by the audio thread.
#[derive(Debug, Default)]
struct TransportState {
    playing: AtomicFlag,
    valid: AtomicFlag,
    frame: AtomicU64,
}

impl TransportState {
    fn publish(&self, info: &TransportInfo) {
        self.frame.store(info.frame, Ordering::Release);
        self.playing.set(info.playing);
        self.valid.set(info.is_valid());
    }
}

/// Control-thread handle to a driver. Cloning is cheap.
#[derive(Clone)]
pub struct DriverHandle {
    actions: Arc<ArrayQueue<DriverAction>>,
    stats: Arc<DriverStats>,
    transport: Arc<TransportState>,
    graph: Arc<RoutingGraph>,
}

impl core::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("pending_actions", &self.actions.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DriverHandle {
    /// Queue an action. Returns `false` when the queue is full.
    pub fn send(&self, action: DriverAction) -> bool {
        self.actions.push(action).is_ok()
    }

    pub fn reset_peaks(&self) -> bool {
        self.send(DriverAction::ResetPeaks)
    }

    /// Panic button.
    pub fn all_notes_off(&self) -> bool {
        self.send(DriverAction::AllNotesOff)
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn is_playing(&self) -> bool {
        self.transport.playing.get()
    }

    /// Transport frame at the start of the last block.
    pub fn transport_frame(&self) -> u64 {
        self.transport.frame.load(Ordering::Acquire)
    }

    /// Whether the server reported a valid timebase in the last block.
    pub fn has_timebase(&self) -> bool {
        self.transport.valid.get()
    }

    /// Freewheel: plugins are waited for instead of skipped when busy.
    pub fn set_offline(&self, offline: bool) {
        self.graph.set_offline(offline);
    }
}

/// Per-callback driver owned by the audio thread.
pub struct AudioCallbackDriver {
    graph: Arc<RoutingGraph>,
    audio_in: AudioBlock,
    audio_out: AudioBlock,
    cv_in: AudioBlock,
    cv_out: AudioBlock,
    events_in: EventBuffer,
    events_out: EventBuffer,
    actions: Arc<ArrayQueue<DriverAction>>,
    stats: Arc<DriverStats>,
    transport: Arc<TransportState>,
    transport_source: Option<Arc<dyn TransportSource>>,
    last_transport: TransportInfo,
    held_in: [f32; 2],
    held_out: [f32; 2],
}

impl core::fmt::Debug for AudioCallbackDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioCallbackDriver")
            .field("max_frames", &self.max_frames())
            .field("audio_ins", &self.audio_in.channels())
            .field("audio_outs", &self.audio_out.channels())
            .finish_non_exhaustive()
    }
}

impl AudioCallbackDriver {
    /// Driver with buffers for the graph's shape and block size.
    pub fn new(graph: Arc<RoutingGraph>) -> Self {
        let shape = graph.shape();
        let max_frames = graph.max_frames();
        Self {
            audio_in: AudioBlock::new(shape.audio_ins, max_frames),
            audio_out: AudioBlock::new(shape.audio_outs, max_frames),
            cv_in: AudioBlock::new(shape.cv_ins, max_frames),
            cv_out: AudioBlock::new(shape.cv_outs, max_frames),
            events_in: EventBuffer::new(),
            events_out: EventBuffer::new(),
            actions: Arc::new(ArrayQueue::new(ACTION_QUEUE_SIZE)),
            stats: Arc::new(DriverStats::default()),
            transport: Arc::new(TransportState::default()),
            transport_source: None,
            last_transport: TransportInfo::INVALID,
            held_in: [0.0; 2],
            held_out: [0.0; 2],
            graph,
        }
    }

    pub fn with_transport(mut self, source: Arc<dyn TransportSource>) -> Self {
        self.transport_source = Some(source);
        self
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            actions: Arc::clone(&self.actions),
            stats: Arc::clone(&self.stats),
            transport: Arc::clone(&self.transport),
            graph: Arc::clone(&self.graph),
        }
    }

    pub fn max_frames(&self) -> usize {
        self.audio_in.max_frames()
    }

    /// Reallocate the buffers after the server changed its block size.
    ///
    /// Call from the server's buffer-size callback, not from [`Self::on_block`].
    pub fn resize(&mut self, max_frames: usize) {
        let shape = self.graph.shape();
        self.audio_in = AudioBlock::new(shape.audio_ins, max_frames);
        self.audio_out = AudioBlock::new(shape.audio_outs, max_frames);
        self.cv_in = AudioBlock::new(shape.cv_ins, max_frames);
        self.cv_out = AudioBlock::new(shape.cv_outs, max_frames);
    }

    /// MIDI input of the coming block. Cleared after every block.
    pub fn events_in_mut(&mut self) -> &mut EventBuffer {
        &mut self.events_in
    }

    /// CV input of the coming block.
    pub fn cv_in_mut(&mut self) -> &mut AudioBlock {
        &mut self.cv_in
    }

    /// MIDI output of the last block.
    pub fn events_out(&self) -> &EventBuffer {
        &self.events_out
    }

    /// CV output of the last block.
    pub fn cv_out(&self) -> &AudioBlock {
        &self.cv_out
    }

    /// Transport state queried for the last block.
    pub fn transport(&self) -> TransportInfo {
        self.last_transport
    }

    /// Run one server callback.
    ///
    /// `inputs` and `outputs` are the server's channel buffers. Missing
    /// inputs read as silence; outputs without a graph channel are zeroed.
    pub fn on_block(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) -> BlockStatus {
        let frames = if frames > self.max_frames() {
            tracing::warn!(
                "Driver: block of {} frames exceeds capacity {}",
                frames,
                self.max_frames()
            );
            self.max_frames()
        } else {
            frames
        };
        for block in [
            &mut self.audio_in,
            &mut self.audio_out,
            &mut self.cv_in,
            &mut self.cv_out,
        ] {
            block.set_frames(frames);
        }

        while let Some(action) = self.actions.pop() {
            self.run_action(action);
        }

        if let Some(source) = &self.transport_source {
            self.last_transport = source.query();
            self.transport.publish(&self.last_transport);
        }

        self.audio_in.clear();
        for (ch, input) in inputs.iter().enumerate().take(self.audio_in.channels()) {
            self.audio_in.copy_channel(ch, input);
        }

        let status = {
            let mut io = ProcessBuffers {
                audio_in: &self.audio_in,
                audio_out: &mut self.audio_out,
                cv_in: &self.cv_in,
                cv_out: &mut self.cv_out,
                events_in: &self.events_in,
                events_out: &mut self.events_out,
            };
            self.graph.process(&mut io, frames)
        };

        for (ch, output) in outputs.iter_mut().enumerate() {
            let source = self.audio_out.channel(ch);
            let n = output.len().min(source.len());
            output[..n].copy_from_slice(&source[..n]);
            output[n..].fill(0.0);
        }

        self.publish(status, frames);
        self.events_in.clear();
        status
    }

    fn run_action(&mut self, action: DriverAction) {
        match action {
            DriverAction::ResetPeaks => {
                self.held_in = [0.0; 2];
                self.held_out = [0.0; 2];
                self.stats.peaks.reset();
            }
            DriverAction::AllNotesOff => {
                let panic = ControlEvent {
                    kind: ControlKind::AllNotesOff,
                    param: 0,
                    midi_value: -1,
                    normalized: 0.0,
                };
                for channel in 0..MIDI_CHANNEL_COUNT {
                    if !self.events_in.push(EngineEvent::control(0, channel, panic)) {
                        tracing::warn!("Driver: MIDI input full, panic truncated");
                        break;
                    }
                }
            }
        }
    }

    fn publish(&mut self, status: BlockStatus, frames: usize) {
        let stats = &self.stats;
        match status {
            BlockStatus::Processed(report) => {
                stats.blocks_processed.fetch_add(1, Ordering::Relaxed);
                stats
                    .frames_processed
                    .fetch_add(frames as u64, Ordering::Relaxed);
                stats
                    .plugins_skipped
                    .fetch_add(report.plugins_skipped as u64, Ordering::Relaxed);
            }
            BlockStatus::Skipped(_) => {
                stats.blocks_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let inputs = block_peaks(&self.audio_in, self.audio_in.channels());
        let outputs = block_peaks(&self.audio_out, self.audio_out.channels());
        for ch in 0..2 {
            self.held_in[ch] = self.held_in[ch].max(inputs[ch]);
            self.held_out[ch] = self.held_out[ch].max(outputs[ch]);
        }
        stats.peaks.publish(self.held_in, self.held_out);
    }
}
