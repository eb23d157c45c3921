//! The routing graph: hosted plugins, their patchbay ports and connections.
//!
//! # Threads
//!
//! [`RoutingGraph::process`] runs on the audio thread and never blocks: it
//! enters the [`Runner`], try-locks the node list and loads the current
//! [`LinkTable`]. Structural changes (adding, removing, replacing, renaming
//! or reordering plugins) run on the control thread behind a
//! [`ScopedRunnerStopper`], so no block is in flight while the node list
//! changes. Connection changes only publish a new link table and never wait
//! for the audio thread.
//!
//! # Modes
//!
//! - [`ProcessMode::Rack`]: every plugin in one serial stereo chain, see
//!   [`crate::rack`].
//! - [`ProcessMode::Patchbay`]: each plugin is a patchbay group whose ports
//!   mirror its client's ports, see [`crate::patchbay`].
//!
//! Both modes register the server's own ports as groups in the graph's
//! [`TopologyDirectory`].

use crate::error::{Error, Result};
use crate::node::{GraphNode, NodeHandle, NodeState};
use crate::rack::{
    RackBuffers, RACK_AUDIO_IN, RACK_AUDIO_OUT, RACK_CHANNELS, RACK_MIDI_IN, RACK_MIDI_OUT,
};
use crate::routing::{check_pair, Endpoint, Link, LinkTable};
use crate::runner::{Runner, ScopedRunnerStopper};
use crate::{patchbay, rack};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use hostgraph_core::compat::{
    Arc, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Mutex, MutexGuard, Ordering, RwLock, Weak,
};
use hostgraph_core::{
    bump_suffix, AtomicFlag, AudioBlock, ClientPortRegistry, CvReconfigure, EngineConfig,
    EventBuffer, Plugin, PluginId, PluginSlot, PortCounts, PortKind, ProcessMode,
};
use hostgraph_patchbay::{
    ConnectionId, GroupId, NotificationSink, PortEntry, PortId, SnapshotPort, TopologyDirectory,
    TopologySnapshot,
};
use std::time::Duration;

pub const AUDIO_INPUT_GROUP: &str = "Audio Input";
pub const AUDIO_OUTPUT_GROUP: &str = "Audio Output";
pub const CV_INPUT_GROUP: &str = "CV Input";
pub const CV_OUTPUT_GROUP: &str = "CV Output";
pub const MIDI_INPUT_GROUP: &str = "MIDI Input";
pub const MIDI_OUTPUT_GROUP: &str = "MIDI Output";
/// Group of the rack's own ports (rack mode only).
pub const RACK_GROUP: &str = "Rack";

const CV_SOURCE_PORT: &str = "cv-source-";

/// Lifecycle of a [`RoutingGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GraphStatus {
    Uninitialized = 0,
    Created = 1,
    /// Created and processing blocks.
    Ready = 2,
    Destroyed = 3,
}

impl GraphStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GraphStatus::Created,
            2 => GraphStatus::Ready,
            3 => GraphStatus::Destroyed,
            _ => GraphStatus::Uninitialized,
        }
    }
}

/// Server-side ports of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphShape {
    pub audio_ins: usize,
    pub audio_outs: usize,
    pub cv_ins: usize,
    pub cv_outs: usize,
    pub midi_in: bool,
    pub midi_out: bool,
}

impl GraphShape {
    pub fn stereo() -> Self {
        Self {
            audio_ins: 2,
            audio_outs: 2,
            cv_ins: 0,
            cv_outs: 0,
            midi_in: true,
            midi_out: true,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            audio_ins: config.audio_ins,
            audio_outs: config.audio_outs,
            cv_ins: config.cv_ins,
            cv_outs: config.cv_outs,
            midi_in: config.midi_in,
            midi_out: config.midi_out,
        }
    }
}

impl Default for GraphShape {
    fn default() -> Self {
        Self::stereo()
    }
}

/// Server buffers of one block.
pub struct ProcessBuffers<'a> {
    pub audio_in: &'a AudioBlock,
    pub audio_out: &'a mut AudioBlock,
    pub cv_in: &'a AudioBlock,
    pub cv_out: &'a mut AudioBlock,
    pub events_in: &'a EventBuffer,
    pub events_out: &'a mut EventBuffer,
}

impl ProcessBuffers<'_> {
    /// Zero every output.
    pub fn silence(&mut self) {
        self.audio_out.clear();
        self.cv_out.clear();
        self.events_out.clear();
    }
}

/// What happened to the plugins during one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockReport {
    pub plugins_processed: usize,
    /// Plugins that were disabled or whose lock was busy.
    pub plugins_skipped: usize,
}

/// Why a whole block was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The graph is not created and activated, or was destroyed.
    NotReady,
    /// A structural change holds the runner.
    RunnerStopped,
    /// The node list was locked by the control thread.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Processed(BlockReport),
    /// Outputs were silenced.
    Skipped(SkipReason),
}

impl BlockStatus {
    pub fn is_processed(&self) -> bool {
        matches!(self, BlockStatus::Processed(_))
    }
}

/// Audio-thread state, try-locked once per block.
struct GraphCore {
    nodes: Vec<GraphNode>,
    rack: Option<RackBuffers>,
    scratch_events: EventBuffer,
    max_frames: usize,
}

/// The internal routing graph.
///
/// Always shared as `Arc<RoutingGraph>`: plugins' CV source mergers hold a
/// weak handle back to it.
pub struct RoutingGraph {
    me: Weak<RoutingGraph>,
    mode: ProcessMode,
    status: AtomicU8,
    shape: RwLock<GraphShape>,
    core: Mutex<GraphCore>,
    links: ArcSwap<LinkTable>,
    endpoints: DashMap<PortId, Endpoint>,
    index: DashMap<PluginId, NodeHandle>,
    order: Mutex<Vec<PluginId>>,
    directory: Arc<TopologyDirectory>,
    runner: Runner,
    stop_timeout: Duration,
    max_plugins: usize,
    next_plugin: AtomicU32,
    generation: AtomicU64,
    buffer_size: AtomicUsize,
    sample_rate: AtomicU64,
    offline: AtomicFlag,
}

impl core::fmt::Debug for RoutingGraph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RoutingGraph")
            .field("mode", &self.mode)
            .field("status", &self.status())
            .field("plugins", &self.index.len())
            .field("links", &self.links.load().len())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl RoutingGraph {
    /// An uninitialized graph configured from `config`. Patchbay changes are
    /// reported to `sink`.
    pub fn new(config: &EngineConfig, sink: Arc<dyn NotificationSink>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            mode: config.process_mode,
            status: AtomicU8::new(GraphStatus::Uninitialized as u8),
            shape: RwLock::new(GraphShape::from_config(config)),
            core: Mutex::new(GraphCore {
                nodes: Vec::new(),
                rack: None,
                scratch_events: EventBuffer::new(),
                max_frames: config.max_buffer_size,
            }),
            links: ArcSwap::from_pointee(LinkTable::default()),
            endpoints: DashMap::new(),
            index: DashMap::new(),
            order: Mutex::new(Vec::new()),
            directory: Arc::new(TopologyDirectory::new(sink)),
            runner: Runner::new(),
            stop_timeout: config.runner_stop_timeout,
            max_plugins: config.max_plugins,
            next_plugin: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            buffer_size: AtomicUsize::new(config.buffer_size),
            sample_rate: AtomicU64::new(config.sample_rate.to_bits()),
            offline: AtomicFlag::new(config.offline),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Allocate the server ports and, in rack mode, the rack with its
    /// default connections.
    pub fn create(&self, shape: GraphShape) -> Result<()> {
        match self.status() {
            GraphStatus::Uninitialized => {}
            GraphStatus::Destroyed => return Err(Error::Destroyed),
            _ => return Err(Error::AlreadyCreated),
        }
        if self.mode == ProcessMode::Rack
            && (shape.audio_ins != RACK_CHANNELS || shape.audio_outs != RACK_CHANNELS)
        {
            tracing::error!(
                "Rack graph needs {} audio ins/outs, got {}/{}",
                RACK_CHANNELS,
                shape.audio_ins,
                shape.audio_outs
            );
            return Err(Error::InvalidRackShape(shape.audio_ins, shape.audio_outs));
        }

        {
            let mut core = self.core.lock();
            if self.mode == ProcessMode::Rack {
                core.rack = Some(RackBuffers::new(core.max_frames));
            }
        }
        *self.shape.write() = shape;

        self.register_server_groups(&shape);
        if self.mode == ProcessMode::Rack {
            self.register_rack(&shape)?;
        }

        self.status
            .store(GraphStatus::Created as u8, Ordering::Release);
        tracing::debug!("Graph created: {:?} {:?}", self.mode, shape);
        Ok(())
    }

    /// Start processing blocks.
    pub fn activate(&self) -> Result<()> {
        self.ensure_created()?;
        self.status.store(GraphStatus::Ready as u8, Ordering::Release);
        Ok(())
    }

    /// Release every node and forget the topology.
    ///
    /// Returns `false` when the graph was already destroyed.
    pub fn destroy(&self) -> bool {
        let previous = self
            .status
            .swap(GraphStatus::Destroyed as u8, Ordering::AcqRel);
        if GraphStatus::from_u8(previous) == GraphStatus::Destroyed {
            return false;
        }

        // blocks until an in-flight block has finished
        let nodes = {
            let mut core = self.core.lock();
            core.rack = None;
            std::mem::take(&mut core.nodes)
        };
        drop(nodes);

        self.index.clear();
        self.order.lock().clear();
        self.endpoints.clear();
        self.links.store(Arc::new(LinkTable::default()));
        self.directory.clear();
        tracing::debug!("Graph destroyed");
        true
    }

    pub fn status(&self) -> GraphStatus {
        GraphStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.status() == GraphStatus::Ready
    }

    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    pub fn shape(&self) -> GraphShape {
        *self.shape.read()
    }

    /// Bumped by every structural change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn directory(&self) -> &Arc<TopologyDirectory> {
        &self.directory
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Park the audio thread until the returned guard drops.
    pub fn stop_runner(&self) -> Result<ScopedRunnerStopper<'_>> {
        ScopedRunnerStopper::new(&self.runner, self.stop_timeout)
    }

    fn ensure_created(&self) -> Result<()> {
        match self.status() {
            GraphStatus::Created | GraphStatus::Ready => Ok(()),
            GraphStatus::Uninitialized => Err(Error::NotCreated),
            GraphStatus::Destroyed => Err(Error::Destroyed),
        }
    }

    fn lock_core(&self) -> Result<MutexGuard<'_, GraphCore>> {
        self.core
            .try_lock_for(self.stop_timeout)
            .ok_or(Error::RunnerTimeout(self.stop_timeout))
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // =========================================================================
    // Engine state
    // =========================================================================

    /// Grow every buffer when `frames` exceeds the allocated block size.
    pub fn set_buffer_size(&self, frames: usize) -> Result<()> {
        if frames == 0 {
            return Err(Error::InvalidBufferSize(frames));
        }
        self.buffer_size.store(frames, Ordering::Release);

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        if frames <= core.max_frames {
            return Ok(());
        }
        let nodes: Vec<GraphNode> = core.nodes.iter().map(|n| n.resized(frames)).collect();
        core.nodes = nodes;
        if core.rack.is_some() {
            core.rack = Some(RackBuffers::new(frames));
        }
        core.max_frames = frames;
        tracing::debug!("Graph buffers grown to {} frames", frames);
        Ok(())
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Acquire)
    }

    /// Largest block the graph's buffers hold.
    pub fn max_frames(&self) -> usize {
        self.core.lock().max_frames
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate
            .store(sample_rate.to_bits(), Ordering::Release);
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    /// Offline (freewheel) processing waits for plugin locks.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.get()
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Process one block.
    ///
    /// Never blocks. A block the graph cannot run leaves the outputs silent.
    pub fn process(&self, io: &mut ProcessBuffers<'_>, frames: usize) -> BlockStatus {
        if !self.is_ready() {
            io.silence();
            return BlockStatus::Skipped(SkipReason::NotReady);
        }
        let Some(_block) = self.runner.enter() else {
            io.silence();
            return BlockStatus::Skipped(SkipReason::RunnerStopped);
        };
        let Some(mut core) = self.core.try_lock() else {
            io.silence();
            return BlockStatus::Skipped(SkipReason::Busy);
        };

        let core = &mut *core;
        let frames = frames.min(core.max_frames);
        let links = self.links.load();
        let offline = self.offline.get();

        let report = match core.rack.as_mut() {
            Some(buffers) => rack::process(buffers, &mut core.nodes, &links, io, frames, offline),
            None => patchbay::process(
                &mut core.nodes,
                &mut core.scratch_events,
                &links,
                io,
                frames,
                offline,
            ),
        };
        BlockStatus::Processed(report)
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    fn check_plugin(&self, plugin: &dyn Plugin) -> Result<PortCounts> {
        let counts = PortCounts::of(plugin);
        if self.mode != ProcessMode::Rack {
            return Ok(counts);
        }
        let reason = if counts.audio_ins > RACK_CHANNELS || counts.audio_outs > RACK_CHANNELS {
            Some("only mono or stereo plugins fit the rack")
        } else if counts.cv_ins > 0 || counts.cv_outs > 0 {
            Some("CV ports are not supported in the rack")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::UnsupportedPlugin {
                name: plugin.name().to_owned(),
                mode: self.mode,
                reason,
            }),
            None => Ok(counts),
        }
    }

    fn unique_group_name(&self, name: &str) -> String {
        let mut candidate = name.to_owned();
        while self.directory.find_group_id(&candidate).is_some() {
            bump_suffix(&mut candidate);
        }
        candidate
    }

    /// Wrap `plugin` into a node and, in patchbay mode, register its group.
    fn build_node(
        &self,
        id: PluginId,
        mut plugin: Box<dyn Plugin>,
        counts: PortCounts,
        max_frames: usize,
    ) -> (GraphNode, NodeHandle) {
        let client = plugin.engine_client_mut();
        let weak: Weak<dyn CvReconfigure> = self.me.clone();
        client.cv_sources().set_graph(weak, id);
        let cv_sources = client.cv_sources().source_count();

        let group = if self.mode == ProcessMode::Patchbay {
            let name = self.unique_group_name(client.name());
            if name != client.name() {
                client.set_name(name.clone());
            }
            self.register_plugin_group(id, &name, client, counts, cv_sources)
        } else {
            GroupId::INVALID
        };

        let slot = Arc::new(PluginSlot::new(id, plugin));
        let state = Arc::new(NodeState::new(cv_sources));
        let node = GraphNode::new(Arc::clone(&slot), Arc::clone(&state), counts, max_frames);
        let handle = NodeHandle {
            slot,
            state,
            counts,
            group,
        };
        (node, handle)
    }

    fn handle(&self, id: PluginId) -> Result<NodeHandle> {
        self.index
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or(Error::PluginNotFound(id))
    }

    /// Append a plugin to the graph. Ids are never reused.
    pub fn add_plugin(&self, plugin: Box<dyn Plugin>) -> Result<PluginId> {
        self.ensure_created()?;
        let counts = self.check_plugin(plugin.as_ref())?;

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        if core.nodes.len() >= self.max_plugins {
            return Err(Error::TooManyPlugins(self.max_plugins));
        }

        let id = PluginId(self.next_plugin.fetch_add(1, Ordering::Relaxed));
        let (node, handle) = self.build_node(id, plugin, counts, core.max_frames);
        core.nodes.push(node);
        self.index.insert(id, handle);
        self.order.lock().push(id);
        drop(core);

        self.bump_generation();
        tracing::debug!("Graph: plugin {} added, {:?}", id, counts);
        Ok(id)
    }

    /// Put `plugin` in the place of plugin `id`, keeping the id and position.
    ///
    /// Connections of the old plugin are dropped.
    pub fn replace_plugin(&self, id: PluginId, plugin: Box<dyn Plugin>) -> Result<()> {
        self.ensure_created()?;
        let old = self.handle(id)?;
        let counts = self.check_plugin(plugin.as_ref())?;

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        let Some(position) = core.nodes.iter().position(|n| n.id == id) else {
            return Err(Error::PluginNotFound(id));
        };

        self.unregister_plugin_group(id, old.group, true);
        let (node, handle) = self.build_node(id, plugin, counts, core.max_frames);
        let previous = std::mem::replace(&mut core.nodes[position], node);
        self.index.insert(id, handle);
        drop(core);
        drop(previous);

        self.bump_generation();
        tracing::debug!("Graph: plugin {} replaced", id);
        Ok(())
    }

    /// Rename a plugin and its patchbay group. Returns the name actually used,
    /// which gets a `" (N)"` suffix when another group has the name.
    pub fn rename_plugin(&self, id: PluginId, name: &str) -> Result<String> {
        self.ensure_created()?;
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let handle = self.handle(id)?;
        let current = self.directory.group(handle.group).map(|g| g.name);
        let name = match current {
            Some(current) if current == name => current,
            Some(_) => self.unique_group_name(name),
            None => name.to_owned(),
        };

        let _stopper = self.stop_runner()?;
        handle
            .slot
            .lock()
            .engine_client_mut()
            .set_name(name.clone());

        if handle.group.is_valid() {
            self.directory.rename_group(handle.group, &name);
            for port in self.directory.ports_of_group(handle.group) {
                let full_name = format!("{}:{}", name, port.short_name);
                self.directory
                    .rename_port(port.port, &port.short_name, &full_name);
            }
        }

        self.bump_generation();
        tracing::debug!("Graph: plugin {} renamed to '{}'", id, name);
        Ok(name)
    }

    /// Swap the processing positions of two plugins.
    pub fn switch_plugins(&self, a: PluginId, b: PluginId) -> Result<()> {
        self.ensure_created()?;
        if a == b {
            return self.handle(a).map(|_| ());
        }

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        let pa = core.nodes.iter().position(|n| n.id == a);
        let pb = core.nodes.iter().position(|n| n.id == b);
        let (pa, pb) = match (pa, pb) {
            (Some(pa), Some(pb)) => (pa, pb),
            (None, _) => return Err(Error::PluginNotFound(a)),
            (_, None) => return Err(Error::PluginNotFound(b)),
        };
        core.nodes.swap(pa, pb);
        {
            let mut order = self.order.lock();
            if let (Some(oa), Some(ob)) = (
                order.iter().position(|&p| p == a),
                order.iter().position(|&p| p == b),
            ) {
                order.swap(oa, ob);
            }
        }
        drop(core);

        self.bump_generation();
        tracing::debug!("Graph: plugins {} and {} switched", a, b);
        Ok(())
    }

    pub fn remove_plugin(&self, id: PluginId) -> Result<()> {
        self.ensure_created()?;
        let handle = self.handle(id)?;

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        let Some(position) = core.nodes.iter().position(|n| n.id == id) else {
            return Err(Error::PluginNotFound(id));
        };
        let node = core.nodes.remove(position);
        self.index.remove(&id);
        self.order.lock().retain(|&p| p != id);
        self.unregister_plugin_group(id, handle.group, true);
        drop(core);
        drop(node);

        self.bump_generation();
        tracing::debug!("Graph: plugin {} removed", id);
        Ok(())
    }

    /// Remove every plugin. With `about_to_close` the patchbay is not told
    /// about the removed groups. Returns how many plugins were removed.
    pub fn remove_all_plugins(&self, about_to_close: bool) -> Result<usize> {
        self.ensure_created()?;

        let _stopper = self.stop_runner()?;
        let mut core = self.lock_core()?;
        let nodes = std::mem::take(&mut core.nodes);
        drop(core);

        for node in &nodes {
            if let Some((_, handle)) = self.index.remove(&node.id) {
                self.unregister_plugin_group(node.id, handle.group, !about_to_close);
            }
        }
        self.order.lock().clear();
        let count = nodes.len();
        drop(nodes);

        self.bump_generation();
        tracing::debug!("Graph: removed all {} plugins", count);
        Ok(count)
    }

    pub fn plugin(&self, id: PluginId) -> Option<Arc<PluginSlot>> {
        self.index.get(&id).map(|h| Arc::clone(&h.slot))
    }

    /// Peaks and counters of a plugin, readable without the graph lock.
    pub fn plugin_state(&self, id: PluginId) -> Option<Arc<NodeState>> {
        self.index.get(&id).map(|h| Arc::clone(&h.state))
    }

    /// Latest `(inputs, outputs)` peaks of a plugin.
    pub fn plugin_peaks(&self, id: PluginId) -> Option<([f32; 2], [f32; 2])> {
        self.index.get(&id).map(|h| h.state.peaks())
    }

    /// Patchbay group of a plugin; `None` in rack mode.
    pub fn plugin_group(&self, id: PluginId) -> Option<GroupId> {
        self.index
            .get(&id)
            .map(|h| h.group)
            .filter(|g| g.is_valid())
    }

    /// Plugin ids in processing order.
    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.order.lock().clone()
    }

    pub fn plugin_count(&self) -> usize {
        self.index.len()
    }

    // =========================================================================
    // Patchbay ports
    // =========================================================================

    fn register_port(&self, group: GroupId, group_name: &str, short_name: &str, endpoint: Endpoint) -> PortId {
        let full_name = format!("{group_name}:{short_name}");
        let port = self
            .directory
            .add_port(group, short_name, &full_name, endpoint.flags());
        if port.is_valid() {
            self.endpoints.insert(port, endpoint);
        }
        port
    }

    fn register_server_groups(&self, shape: &GraphShape) {
        let groups: [(&str, usize, &str, fn(usize) -> Endpoint); 4] = [
            (AUDIO_INPUT_GROUP, shape.audio_ins, "capture_", Endpoint::AudioIn),
            (AUDIO_OUTPUT_GROUP, shape.audio_outs, "playback_", Endpoint::AudioOut),
            (CV_INPUT_GROUP, shape.cv_ins, "cv_capture_", Endpoint::CvIn),
            (CV_OUTPUT_GROUP, shape.cv_outs, "cv_playback_", Endpoint::CvOut),
        ];
        for (name, count, prefix, endpoint) in groups {
            // the rack has no CV ports
            if count == 0 || (self.mode == ProcessMode::Rack && endpoint(0).kind() == PortKind::Cv) {
                continue;
            }
            let group = self.directory.add_group(name);
            for i in 0..count {
                self.register_port(group, name, &format!("{}{}", prefix, i + 1), endpoint(i));
            }
        }

        if shape.midi_in {
            let group = self.directory.add_group(MIDI_INPUT_GROUP);
            self.register_port(group, MIDI_INPUT_GROUP, "midi_capture", Endpoint::MidiIn);
        }
        if shape.midi_out {
            let group = self.directory.add_group(MIDI_OUTPUT_GROUP);
            self.register_port(group, MIDI_OUTPUT_GROUP, "midi_playback", Endpoint::MidiOut);
        }
    }

    /// Rack ports, wired to the first two server channels and the MIDI ports.
    fn register_rack(&self, shape: &GraphShape) -> Result<()> {
        let group = self.directory.add_group(RACK_GROUP);
        if !group.is_valid() {
            return Err(Error::ConnectionFailed("cannot register the rack group".into()));
        }

        for ch in 0..RACK_CHANNELS {
            self.register_port(group, RACK_GROUP, RACK_AUDIO_IN[ch], Endpoint::RackIn(ch));
            self.register_port(group, RACK_GROUP, RACK_AUDIO_OUT[ch], Endpoint::RackOut(ch));
        }
        self.register_port(group, RACK_GROUP, RACK_MIDI_IN, Endpoint::RackMidiIn);
        self.register_port(group, RACK_GROUP, RACK_MIDI_OUT, Endpoint::RackMidiOut);

        let mut defaults = Vec::new();
        for ch in 0..RACK_CHANNELS {
            defaults.push((
                format!("{}:capture_{}", AUDIO_INPUT_GROUP, ch + 1),
                format!("{}:{}", RACK_GROUP, RACK_AUDIO_IN[ch]),
            ));
            defaults.push((
                format!("{}:{}", RACK_GROUP, RACK_AUDIO_OUT[ch]),
                format!("{}:playback_{}", AUDIO_OUTPUT_GROUP, ch + 1),
            ));
        }
        if shape.midi_in {
            defaults.push((
                format!("{}:midi_capture", MIDI_INPUT_GROUP),
                format!("{}:{}", RACK_GROUP, RACK_MIDI_IN),
            ));
        }
        if shape.midi_out {
            defaults.push((
                format!("{}:{}", RACK_GROUP, RACK_MIDI_OUT),
                format!("{}:midi_playback", MIDI_OUTPUT_GROUP),
            ));
        }
        for (source, target) in defaults {
            self.connect_by_name(&source, &target)?;
        }
        Ok(())
    }

    fn register_plugin_group(
        &self,
        id: PluginId,
        name: &str,
        client: &ClientPortRegistry,
        counts: PortCounts,
        cv_sources: usize,
    ) -> GroupId {
        let group = self.directory.add_group_for(name, Some(id));
        if !group.is_valid() {
            tracing::warn!("Graph: plugin {} has no usable group name", id);
            return group;
        }

        let mut next = [0usize; 6];
        client.for_each_name(|kind, is_input, short_name| {
            let list = match kind {
                PortKind::Audio => 0,
                PortKind::Cv => 2,
                PortKind::Event => 4,
            } + usize::from(!is_input);
            let index = next[list];
            next[list] += 1;
            self.register_port(
                group,
                name,
                short_name,
                Endpoint::Plugin {
                    id,
                    kind,
                    index,
                    is_input,
                },
            );
        });

        for source in 0..cv_sources {
            self.register_cv_source_port(id, group, name, counts, source);
        }
        group
    }

    fn register_cv_source_port(&self, id: PluginId, group: GroupId, name: &str, counts: PortCounts, source: usize) -> PortId {
        self.register_port(
            group,
            name,
            &format!("{}{}", CV_SOURCE_PORT, source + 1),
            Endpoint::Plugin {
                id,
                kind: PortKind::Cv,
                index: counts.cv_ins + source,
                is_input: true,
            },
        )
    }

    /// Drop the links and ports of a plugin; with `notify` its group is also
    /// removed from the patchbay.
    fn unregister_plugin_group(&self, id: PluginId, group: GroupId, notify: bool) {
        self.links.rcu(|table| table.without(|l| l.touches_plugin(id)));
        self.endpoints
            .retain(|_, endpoint| endpoint.plugin() != Some(id));
        if notify && group.is_valid() {
            self.directory.remove_group(group);
        }
    }

    // =========================================================================
    // Connections
    // =========================================================================

    fn connect_ports(&self, source: &PortEntry, target: &PortEntry) -> Result<ConnectionId> {
        let endpoint = |entry: &PortEntry| {
            self.endpoints
                .get(&entry.port)
                .map(|e| *e)
                .ok_or_else(|| Error::ConnectionFailed(format!("'{}' is not a graph port", entry.full_name)))
        };
        let (from, to) = (endpoint(source)?, endpoint(target)?);
        check_pair(from, to, self.mode == ProcessMode::Rack).map_err(|reason| {
            Error::ConnectionFailed(format!("{} -> {}: {}", source.full_name, target.full_name, reason))
        })?;
        if self
            .links
            .load()
            .iter()
            .any(|l| l.source_port == source.port && l.target_port == target.port)
        {
            return Err(Error::ConnectionFailed(format!(
                "{} -> {}: already connected",
                source.full_name, target.full_name
            )));
        }

        let connection = self
            .directory
            .add_connection(source.group, source.port, target.group, target.port);
        if !connection.is_valid() {
            return Err(Error::ConnectionFailed(format!(
                "{} -> {}: port vanished",
                source.full_name, target.full_name
            )));
        }
        let link = Link {
            connection,
            source_port: source.port,
            target_port: target.port,
            source: from,
            target: to,
        };
        self.links.rcu(|table| table.with(link));
        Ok(connection)
    }

    /// Connect output `port_a` of `group_a` to input `port_b` of `group_b`.
    pub fn connect(&self, group_a: GroupId, port_a: PortId, group_b: GroupId, port_b: PortId) -> Result<ConnectionId> {
        self.ensure_created()?;
        let lookup = |group: GroupId, port: PortId| {
            self.directory
                .port(port)
                .filter(|p| p.group == group)
                .ok_or_else(|| Error::ConnectionFailed(format!("port {group}:{port} not found")))
        };
        let (source, target) = (lookup(group_a, port_a)?, lookup(group_b, port_b)?);
        self.connect_ports(&source, &target)
    }

    /// Connect two ports given as `"group:port"` full names.
    pub fn connect_by_name(&self, source: &str, target: &str) -> Result<ConnectionId> {
        let lookup = |name: &str| {
            let entry = self.directory.find_port(name);
            if entry.is_valid() {
                Ok(entry)
            } else {
                Err(Error::ConnectionFailed(format!("port '{name}' not found")))
            }
        };
        let (source, target) = (lookup(source)?, lookup(target)?);
        self.connect_ports(&source, &target)
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<()> {
        self.ensure_created()?;
        if !self.links.load().iter().any(|l| l.connection == connection) {
            return Err(Error::ConnectionFailed(format!("connection {connection} not found")));
        }
        self.links
            .rcu(|table| table.without(|l| l.connection == connection));
        self.directory.remove_connection(connection);
        Ok(())
    }

    /// Remove every connection of `group`. Returns how many were removed.
    pub fn disconnect_internal_group(&self, group: GroupId) -> Result<usize> {
        self.ensure_created()?;
        let ports: Vec<PortId> = self
            .directory
            .ports_of_group(group)
            .into_iter()
            .map(|p| p.port)
            .collect();
        self.links.rcu(|table| {
            table.without(|l| ports.contains(&l.source_port) || ports.contains(&l.target_port))
        });
        Ok(self.directory.disconnect_group(group))
    }

    /// Re-announce the whole topology.
    ///
    /// The directory is rebuilt from its own contents, so every group, port
    /// and connection gets a new id and a fresh notification; canvas
    /// positions are kept.
    pub fn refresh(&self) -> Result<()> {
        self.ensure_created()?;

        let groups = self.directory.groups();
        let ports = self.directory.ports();
        let group_name = |id: GroupId| {
            groups
                .iter()
                .find(|g| g.id == id)
                .map(|g| g.name.clone())
        };
        let full_name = |id: PortId| {
            ports
                .iter()
                .find(|p| p.port == id)
                .map(|p| p.full_name.clone())
        };

        let snapshot = TopologySnapshot {
            groups: groups.iter().map(|g| (g.name.clone(), g.plugin)).collect(),
            ports: ports
                .iter()
                .filter_map(|p| {
                    Some(SnapshotPort {
                        group: group_name(p.group)?,
                        short_name: p.short_name.clone(),
                        full_name: p.full_name.clone(),
                        flags: p.flags,
                    })
                })
                .collect(),
            connections: self
                .directory
                .connections()
                .iter()
                .filter_map(|c| Some((full_name(c.port_a)?, full_name(c.port_b)?)))
                .collect(),
        };
        let endpoints: Vec<(String, Endpoint)> = ports
            .iter()
            .filter_map(|p| self.endpoints.get(&p.port).map(|e| (p.full_name.clone(), *e)))
            .collect();
        let plugin_groups: Vec<(PluginId, String)> = self
            .index
            .iter()
            .filter_map(|h| Some((*h.key(), group_name(h.group)?)))
            .collect();
        let positions = self.directory.positions();

        self.directory.refresh(&snapshot);

        self.endpoints.clear();
        for (name, endpoint) in endpoints {
            let entry = self.directory.find_port(&name);
            if entry.is_valid() {
                self.endpoints.insert(entry.port, endpoint);
            }
        }
        for (id, name) in plugin_groups {
            if let (Some(mut handle), Some(group)) =
                (self.index.get_mut(&id), self.directory.find_group_id(&name))
            {
                handle.group = group;
            }
        }
        for position in positions {
            if let Some(group) = self.directory.find_group_id(&position.name) {
                self.directory
                    .set_position(group, position.x1, position.y1, position.x2, position.y2);
            }
        }

        let links: Vec<Link> = self
            .directory
            .connections()
            .iter()
            .filter_map(|c| {
                Some(Link {
                    connection: c.id,
                    source_port: c.port_a,
                    target_port: c.port_b,
                    source: self.endpoints.get(&c.port_a).map(|e| *e)?,
                    target: self.endpoints.get(&c.port_b).map(|e| *e)?,
                })
            })
            .collect();
        self.links.store(Arc::new(LinkTable::from(links)));
        Ok(())
    }

    /// Every connection as `(source, target)` full port names.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.links
            .load()
            .iter()
            .filter_map(|l| {
                let source = self.directory.port(l.source_port)?;
                let target = self.directory.port(l.target_port)?;
                Some((source.full_name, target.full_name))
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.links.load().len()
    }

    pub fn group_and_port(&self, full_name: &str) -> Option<(GroupId, PortId)> {
        self.directory.group_and_port(full_name)
    }
}

impl CvReconfigure for RoutingGraph {
    fn reconfigure_for_cv(&self, plugin: PluginId, cv_index: usize, added: bool) {
        let Some(handle) = self.index.get(&plugin).map(|h| h.value().clone()) else {
            tracing::warn!("Graph: CV source change for unknown plugin {}", plugin);
            return;
        };
        let count = if added {
            handle.state.add_cv_source()
        } else {
            handle.state.remove_cv_source()
        };
        tracing::debug!(
            "Graph: plugin {} CV source {} {}, {} now",
            plugin,
            cv_index,
            if added { "added" } else { "removed" },
            count
        );

        if !handle.group.is_valid() {
            return;
        }
        let Some(group) = self.directory.group(handle.group) else {
            return;
        };
        if added {
            self.register_cv_source_port(plugin, handle.group, &group.name, handle.counts, count - 1);
            return;
        }

        let entry = self
            .directory
            .find_port(&format!("{}:{}{}", group.name, CV_SOURCE_PORT, cv_index + 1));
        if !entry.is_valid() {
            return;
        }
        let stale: Vec<ConnectionId> = self
            .links
            .load()
            .iter()
            .filter(|l| l.target_port == entry.port)
            .map(|l| l.connection)
            .collect();
        self.links
            .rcu(|table| table.without(|l| l.target_port == entry.port));
        for connection in stale {
            self.directory.remove_connection(connection);
        }
        self.endpoints.remove(&entry.port);
        self.directory.remove_port(entry.port);

        // later sources moved down one slot in the merger; their ports and
        // links follow, keeping port ids and connections
        for source in cv_index..count {
            let moved = self
                .directory
                .find_port(&format!("{}:{}{}", group.name, CV_SOURCE_PORT, source + 2));
            if !moved.is_valid() {
                continue;
            }
            let short_name = format!("{}{}", CV_SOURCE_PORT, source + 1);
            self.directory
                .rename_port(moved.port, &short_name, &format!("{}:{}", group.name, short_name));
            let endpoint = Endpoint::Plugin {
                id: plugin,
                kind: PortKind::Cv,
                index: handle.counts.cv_ins + source,
                is_input: true,
            };
            self.endpoints.insert(moved.port, endpoint);
            self.links.rcu(|table| table.retarget(moved.port, endpoint));
        }
    }
}
