//! Patchbay mode: plugins wired by arbitrary connections.
//!
//! Nodes run in their stable order. Before a node runs, its inputs are
//! rebuilt from the current link table: server inputs and the outputs of
//! other nodes are summed into the node's input blocks. A connection from a
//! node later in the order therefore carries that node's previous block.

use crate::graph::{BlockReport, ProcessBuffers};
use crate::node::{block_peaks, GraphNode};
use crate::routing::{Endpoint, LinkTable};
use hostgraph_core::{AudioBlock, EventBuffer, PluginId, PortKind};

/// Server-side inputs of one block.
#[derive(Clone, Copy)]
struct ServerInputs<'a> {
    audio: &'a AudioBlock,
    cv: &'a AudioBlock,
    events: &'a EventBuffer,
}

fn find(nodes: &[GraphNode], id: PluginId) -> Option<&GraphNode> {
    nodes.iter().find(|n| n.id == id)
}

fn audio_source<'a>(source: Endpoint, server: ServerInputs<'a>, nodes: &'a [GraphNode]) -> &'a [f32] {
    match source {
        Endpoint::AudioIn(index) => server.audio.channel(index),
        Endpoint::Plugin {
            id,
            kind: PortKind::Audio,
            index,
            is_input: false,
        } => match find(nodes, id) {
            Some(node) => node.audio_out.channel(index),
            None => &[],
        },
        _ => &[],
    }
}

fn cv_source<'a>(source: Endpoint, server: ServerInputs<'a>, nodes: &'a [GraphNode]) -> &'a [f32] {
    match source {
        Endpoint::CvIn(index) => server.cv.channel(index),
        Endpoint::Plugin {
            id,
            kind: PortKind::Cv,
            index,
            is_input: false,
        } => match find(nodes, id) {
            Some(node) => node.cv_out.channel(index),
            None => &[],
        },
        _ => &[],
    }
}

/// Only the default (first) event port of a plugin carries events.
fn event_source<'a>(source: Endpoint, server: ServerInputs<'a>, nodes: &'a [GraphNode]) -> Option<&'a EventBuffer> {
    match source {
        Endpoint::MidiIn => Some(server.events),
        Endpoint::Plugin {
            id,
            kind: PortKind::Event,
            index: 0,
            is_input: false,
        } => find(nodes, id).map(|n| &n.events_out),
        _ => None,
    }
}

fn gather(
    id: PluginId,
    audio_in: &mut AudioBlock,
    cv_in: &mut AudioBlock,
    events_in: &mut EventBuffer,
    nodes: &[GraphNode],
    links: &LinkTable,
    server: ServerInputs<'_>,
) {
    for link in links.iter() {
        let Endpoint::Plugin {
            id: target,
            kind,
            index,
            is_input: true,
        } = link.target
        else {
            continue;
        };
        if target != id {
            continue;
        }
        match kind {
            PortKind::Audio => audio_in.add_channel(index, audio_source(link.source, server, nodes)),
            PortKind::Cv => cv_in.add_channel(index, cv_source(link.source, server, nodes)),
            PortKind::Event if index == 0 => {
                if let Some(events) = event_source(link.source, server, nodes) {
                    events_in.merge_from(events);
                }
            }
            PortKind::Event => {}
        }
    }
}

pub(crate) fn process(
    nodes: &mut [GraphNode],
    scratch: &mut EventBuffer,
    links: &LinkTable,
    io: &mut ProcessBuffers<'_>,
    frames: usize,
    offline: bool,
) -> BlockReport {
    let mut report = BlockReport::default();
    let server = ServerInputs {
        audio: io.audio_in,
        cv: io.cv_in,
        events: io.events_in,
    };

    for i in 0..nodes.len() {
        let id = nodes[i].id;
        nodes[i].begin_block(frames);

        // detach the inputs so the other nodes stay readable
        let mut audio_in = core::mem::take(&mut nodes[i].audio_in);
        let mut cv_in = core::mem::take(&mut nodes[i].cv_in);
        core::mem::swap(&mut nodes[i].events_in, scratch);
        gather(id, &mut audio_in, &mut cv_in, scratch, nodes, links, server);

        let node = &mut nodes[i];
        node.audio_in = audio_in;
        node.cv_in = cv_in;
        core::mem::swap(&mut node.events_in, scratch);

        if node.run(frames, offline) {
            report.plugins_processed += 1;
            let inputs = block_peaks(&node.audio_in, node.counts.audio_ins);
            let outputs = block_peaks(&node.audio_out, node.counts.audio_outs);
            node.state.set_peaks(inputs, outputs);
        } else {
            report.plugins_skipped += 1;
        }
    }

    io.audio_out.clear();
    io.cv_out.clear();
    io.events_out.clear();
    for link in links.iter() {
        match link.target {
            Endpoint::AudioOut(index) => {
                io.audio_out
                    .add_channel(index, audio_source(link.source, server, nodes));
            }
            Endpoint::CvOut(index) => {
                io.cv_out.add_channel(index, cv_source(link.source, server, nodes));
            }
            Endpoint::MidiOut => {
                if let Some(events) = event_source(link.source, server, nodes) {
                    io.events_out.merge_from(events);
                }
            }
            _ => {}
        }
    }

    report
}
