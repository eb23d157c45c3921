//! Rack mode: every plugin in one serial stereo chain.
//!
//! The rack has two audio inputs and outputs plus one event input and output.
//! Which server ports feed and receive them is decided by the link table, so
//! the rack can be wired to any subset of the server's channels.

use crate::graph::{BlockReport, ProcessBuffers};
use crate::node::{block_peaks, GraphNode};
use crate::routing::{Endpoint, LinkTable};
use hostgraph_core::{AudioBlock, EventBuffer};

pub(crate) const RACK_CHANNELS: usize = 2;

pub(crate) const RACK_AUDIO_IN: [&str; RACK_CHANNELS] = ["audio-in1", "audio-in2"];
pub(crate) const RACK_AUDIO_OUT: [&str; RACK_CHANNELS] = ["audio-out1", "audio-out2"];
pub(crate) const RACK_MIDI_IN: &str = "midi-in";
pub(crate) const RACK_MIDI_OUT: &str = "midi-out";

/// Fixed buffers of the rack itself.
#[derive(Debug)]
pub(crate) struct RackBuffers {
    input: AudioBlock,
    output: AudioBlock,
    events_in: EventBuffer,
    events_out: EventBuffer,
}

impl RackBuffers {
    pub(crate) fn new(max_frames: usize) -> Self {
        Self {
            input: AudioBlock::new(RACK_CHANNELS, max_frames),
            output: AudioBlock::new(RACK_CHANNELS, max_frames),
            events_in: EventBuffer::new(),
            events_out: EventBuffer::new(),
        }
    }

    fn begin_block(&mut self, frames: usize) {
        for block in [&mut self.input, &mut self.output] {
            block.set_frames(frames);
            block.clear();
        }
        self.events_in.clear();
        self.events_out.clear();
    }
}

/// Pull the server inputs into the rack, run the chain, push the rack
/// outputs to the server.
pub(crate) fn process(
    rack: &mut RackBuffers,
    nodes: &mut [GraphNode],
    links: &LinkTable,
    io: &mut ProcessBuffers<'_>,
    frames: usize,
    offline: bool,
) -> BlockReport {
    rack.begin_block(frames);

    // unconnected rack inputs stay silent
    for ch in 0..RACK_CHANNELS {
        for source in links.sources_of(Endpoint::RackIn(ch)) {
            if let Endpoint::AudioIn(index) = source {
                rack.input.add_channel(ch, io.audio_in.channel(index));
            }
        }
    }
    if links.sources_of(Endpoint::RackMidiIn).any(|s| s == Endpoint::MidiIn) {
        rack.events_in.copy_from(io.events_in);
    }

    let report = run_chain(rack, nodes, frames, offline);

    io.audio_out.clear();
    io.cv_out.clear();
    io.events_out.clear();
    for link in links.iter() {
        if let (Endpoint::RackOut(ch), Endpoint::AudioOut(index)) = (link.source, link.target) {
            io.audio_out.add_channel(index, rack.output.channel(ch));
        }
    }
    if links.sources_of(Endpoint::MidiOut).any(|s| s == Endpoint::RackMidiOut) {
        io.events_out.copy_from(&rack.events_out);
    }

    report
}

/// Serial chain over the enabled plugins.
///
/// Once a plugin has run, the next one reads its outputs. A plugin without
/// audio inputs has the chain input mixed into its output, a mono output is
/// copied to both channels, and a plugin without event outputs hands on the
/// events it received. With nothing processed the rack is a pure bypass
/// with no events out.
fn run_chain(rack: &mut RackBuffers, nodes: &mut [GraphNode], frames: usize, offline: bool) -> BlockReport {
    let mut report = BlockReport::default();
    let mut processed = false;

    for node in nodes.iter_mut() {
        node.begin_block(frames);
        let audio_source = if processed { &rack.output } else { &rack.input };
        for ch in 0..node.counts.audio_ins.min(RACK_CHANNELS) {
            node.audio_in.copy_channel(ch, audio_source.channel(ch));
        }
        let event_source = if processed { &rack.events_out } else { &rack.events_in };
        node.events_in.copy_from(event_source);

        if !node.run(frames, offline) {
            report.plugins_skipped += 1;
            continue;
        }
        report.plugins_processed += 1;

        // the previous outputs become this plugin's inputs
        if processed {
            for ch in 0..RACK_CHANNELS {
                rack.input.copy_channel(ch, rack.output.channel(ch));
            }
            rack.events_in.copy_from(&rack.events_out);
        }

        rack.output.clear();
        for ch in 0..node.counts.audio_outs.min(RACK_CHANNELS) {
            rack.output.copy_channel(ch, node.audio_out.channel(ch));
        }
        if node.counts.audio_ins == 0 {
            for ch in 0..RACK_CHANNELS {
                rack.output.add_channel(ch, rack.input.channel(ch));
            }
        }
        if node.counts.audio_outs == 1 {
            rack.output.duplicate_channel(0, 1);
        }
        rack.events_out.copy_from(&node.events_out);
        if node.counts.midi_outs == 0 && rack.events_out.is_empty() {
            rack.events_out.copy_from(&rack.events_in);
        }

        let inputs = if node.counts.audio_ins > 0 {
            block_peaks(&rack.input, RACK_CHANNELS)
        } else {
            [0.0; 2]
        };
        let outputs = if node.counts.audio_outs > 0 {
            block_peaks(&rack.output, RACK_CHANNELS)
        } else {
            [0.0; 2]
        };
        node.state.set_peaks(inputs, outputs);
        processed = true;
    }

    if !processed {
        for ch in 0..RACK_CHANNELS {
            rack.output.copy_channel(ch, rack.input.channel(ch));
        }
        rack.events_out.clear();
    }
    report
}
