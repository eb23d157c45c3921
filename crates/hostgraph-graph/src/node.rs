//! Graph nodes: one hosted plugin plus the buffers it is processed with.

use hostgraph_core::compat::{Arc, AtomicU64, AtomicUsize, Ordering};
use hostgraph_core::{
    max_normalized, AudioBlock, EventBuffer, PeakLevels, PluginId, PluginSlot, PortCounts,
    MAX_CV_SOURCES,
};
use hostgraph_patchbay::GroupId;

/// Node state shared with the control thread without the graph lock.
#[derive(Debug, Default)]
pub struct NodeState {
    peaks: PeakLevels,
    cv_sources: AtomicUsize,
    skipped_blocks: AtomicU64,
}

impl NodeState {
    pub(crate) fn new(cv_sources: usize) -> Self {
        Self {
            cv_sources: AtomicUsize::new(cv_sources.min(MAX_CV_SOURCES)),
            ..Self::default()
        }
    }

    /// Latest `(inputs, outputs)` peaks of the first two channels.
    pub fn peaks(&self) -> ([f32; 2], [f32; 2]) {
        self.peaks.get()
    }

    /// CV source channels appended after the plugin's own CV inputs.
    pub fn cv_sources(&self) -> usize {
        self.cv_sources.load(Ordering::Acquire)
    }

    /// Blocks in which the plugin was disabled or its lock was busy.
    pub fn skipped_blocks(&self) -> u64 {
        self.skipped_blocks.load(Ordering::Relaxed)
    }

    pub(crate) fn add_cv_source(&self) -> usize {
        let count = (self.cv_sources() + 1).min(MAX_CV_SOURCES);
        self.cv_sources.store(count, Ordering::Release);
        count
    }

    pub(crate) fn remove_cv_source(&self) -> usize {
        let count = self.cv_sources().saturating_sub(1);
        self.cv_sources.store(count, Ordering::Release);
        count
    }

    pub(crate) fn set_peaks(&self, inputs: [f32; 2], outputs: [f32; 2]) {
        self.peaks.publish(inputs, outputs);
    }
}

/// Control-thread view of a node, kept in the graph's index.
#[derive(Debug, Clone)]
pub(crate) struct NodeHandle {
    pub slot: Arc<PluginSlot>,
    pub state: Arc<NodeState>,
    pub counts: PortCounts,
    pub group: GroupId,
}

/// Peaks of up to the first two channels of `block`.
pub(crate) fn block_peaks(block: &AudioBlock, channels: usize) -> [f32; 2] {
    let mut peaks = [0.0; 2];
    for (ch, peak) in peaks.iter_mut().enumerate().take(channels.min(block.channels())) {
        *peak = max_normalized(block.channel(ch));
    }
    peaks
}

pub(crate) struct GraphNode {
    pub id: PluginId,
    pub slot: Arc<PluginSlot>,
    pub state: Arc<NodeState>,
    pub counts: PortCounts,
    pub audio_in: AudioBlock,
    pub audio_out: AudioBlock,
    /// Plugin CV inputs followed by room for every CV source.
    pub cv_in: AudioBlock,
    pub cv_out: AudioBlock,
    pub events_in: EventBuffer,
    pub events_out: EventBuffer,
}

impl GraphNode {
    pub(crate) fn new(slot: Arc<PluginSlot>, state: Arc<NodeState>, counts: PortCounts, max_frames: usize) -> Self {
        Self {
            id: slot.id(),
            slot,
            state,
            counts,
            audio_in: AudioBlock::new(counts.audio_ins, max_frames),
            audio_out: AudioBlock::new(counts.audio_outs, max_frames),
            cv_in: AudioBlock::with_channel_capacity(counts.cv_ins, counts.cv_ins + MAX_CV_SOURCES, max_frames),
            cv_out: AudioBlock::new(counts.cv_outs, max_frames),
            events_in: EventBuffer::new(),
            events_out: EventBuffer::new(),
        }
    }

    /// Same node with buffers for a new maximum block size.
    pub(crate) fn resized(&self, max_frames: usize) -> Self {
        Self::new(Arc::clone(&self.slot), Arc::clone(&self.state), self.counts, max_frames)
    }

    /// Size every input buffer for a block of `frames` and zero it.
    pub(crate) fn begin_block(&mut self, frames: usize) {
        let cv_channels = self.counts.cv_ins + self.state.cv_sources();
        let cv_channels = cv_channels.min(self.cv_in.channel_capacity());
        self.cv_in.set_channels(cv_channels);

        for block in [&mut self.audio_in, &mut self.cv_in] {
            block.set_frames(frames);
            block.clear();
        }
        self.events_in.clear();
    }

    /// Run the plugin on the node's buffers.
    ///
    /// Outputs are zeroed first, so a plugin that is disabled or whose lock is
    /// busy leaves silence and no events. Returns whether the plugin ran.
    pub(crate) fn run(&mut self, frames: usize, offline: bool) -> bool {
        for block in [&mut self.audio_out, &mut self.cv_out] {
            block.set_frames(frames);
            block.clear();
        }
        self.events_out.clear();

        let slot = Arc::clone(&self.slot);
        if !slot.is_enabled() {
            self.skip();
            return false;
        }
        let Some(mut plugin) = slot.try_lock(offline) else {
            self.skip();
            return false;
        };

        plugin.init_buffers(frames);
        let client = plugin.engine_client_mut();
        if let Some(port) = client.default_event_in_mut() {
            port.buffer_mut().merge_from(&self.events_in);
        }
        client.merge_cv_sources(&self.cv_in, self.counts.cv_ins, frames);

        plugin.process(&self.audio_in, &mut self.audio_out, &self.cv_in, &mut self.cv_out, frames);

        if let Some(port) = plugin.engine_client().default_event_out() {
            self.events_out.copy_from(port.buffer());
        }
        true
    }

    fn skip(&mut self) {
        self.state.skipped_blocks.fetch_add(1, Ordering::Relaxed);
        self.state.set_peaks([0.0; 2], [0.0; 2]);
    }
}
