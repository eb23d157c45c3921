//! HostEngine that ties graph, topology and driver together

use crate::{Error, HostEngineBuilder, Result};
use hostgraph_core::compat::{Arc, Mutex};
use hostgraph_core::{AtomicFlag, EngineConfig, Plugin, PluginId, ProcessMode};
use hostgraph_graph::{AudioCallbackDriver, DriverHandle, GraphShape, RoutingGraph};
use hostgraph_patchbay::{
    ConnectionId, GroupId, GroupPosition, NotificationDrain, NotificationSink, PortId,
    ServerNotifications, TopologyDirectory, TransportSource,
};

/// A plugin host routing engine.
///
/// Owns the [`RoutingGraph`] with its internal patchbay, a second directory
/// mirroring the audio server's own clients, the drain that feeds it, and
/// the audio callback driver.
///
/// Control-thread methods take `&self`; the driver is handed out once to the
/// audio-server thread.
///
/// # Example
///
/// ```ignore
/// use hostgraph::prelude::*;
///
/// let engine = HostEngine::builder().build()?;
/// let mut driver = engine.driver().expect("first call");
///
/// let id = engine.add_plugin(Box::new(my_plugin))?;
///
/// // audio thread
/// driver.on_block(&inputs, &mut outputs, frames);
///
/// // control thread, periodically
/// engine.idle();
/// ```
pub struct HostEngine {
    config: EngineConfig,
    graph: Arc<RoutingGraph>,
    server_directory: Arc<TopologyDirectory>,
    drain: Arc<NotificationDrain>,
    driver: Mutex<Option<AudioCallbackDriver>>,
    driver_handle: DriverHandle,
    closed: AtomicFlag,
}

impl std::fmt::Debug for HostEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEngine")
            .field("mode", &self.config.process_mode)
            .field("graph", &self.graph)
            .field("pending_notifications", &self.drain.pending_count())
            .field("closed", &self.closed.get())
            .finish_non_exhaustive()
    }
}

impl HostEngine {
    pub fn builder() -> HostEngineBuilder {
        HostEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        sink: Arc<dyn NotificationSink>,
        transport: Option<Arc<dyn TransportSource>>,
    ) -> Result<Self> {
        let graph = RoutingGraph::new(&config, Arc::clone(&sink));
        graph.create(GraphShape::from_config(&config))?;
        graph.activate()?;

        let mut driver = AudioCallbackDriver::new(Arc::clone(&graph));
        if let Some(source) = transport {
            driver = driver.with_transport(source);
        }
        let driver_handle = driver.handle();

        tracing::info!(
            "Host engine ready: {:?}, {} Hz, {} frames",
            config.process_mode,
            config.sample_rate,
            config.buffer_size
        );
        Ok(Self {
            server_directory: Arc::new(TopologyDirectory::new(sink)),
            drain: Arc::new(NotificationDrain::new()),
            driver: Mutex::new(Some(driver)),
            driver_handle,
            closed: AtomicFlag::new(false),
            config,
            graph,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> ProcessMode {
        self.config.process_mode
    }

    pub fn graph(&self) -> &Arc<RoutingGraph> {
        &self.graph
    }

    /// Groups, ports and connections inside the graph.
    pub fn directory(&self) -> &Arc<TopologyDirectory> {
        self.graph.directory()
    }

    /// Clients and connections of the audio server, as replayed by [`Self::idle`].
    pub fn server_directory(&self) -> &Arc<TopologyDirectory> {
        &self.server_directory
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Plugins
    // =========================================================================

    pub fn add_plugin(&self, plugin: Box<dyn Plugin>) -> Result<PluginId> {
        self.ensure_open()?;
        Ok(self.graph.add_plugin(plugin)?)
    }

    /// Swap the instance behind `id`, keeping its place and connections.
    pub fn replace_plugin(&self, id: PluginId, plugin: Box<dyn Plugin>) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.replace_plugin(id, plugin)?)
    }

    /// Returns the name actually given, which may carry a ` (n)` suffix.
    pub fn rename_plugin(&self, id: PluginId, name: &str) -> Result<String> {
        self.ensure_open()?;
        Ok(self.graph.rename_plugin(id, name)?)
    }

    pub fn switch_plugins(&self, a: PluginId, b: PluginId) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.switch_plugins(a, b)?)
    }

    pub fn remove_plugin(&self, id: PluginId) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.remove_plugin(id)?)
    }

    pub fn remove_all_plugins(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.graph.remove_all_plugins(false)?)
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.graph.plugin_ids()
    }

    pub fn plugin_count(&self) -> usize {
        self.graph.plugin_count()
    }

    /// `(inputs, outputs)` peaks of the plugin's last block.
    pub fn plugin_peaks(&self, id: PluginId) -> Option<([f32; 2], [f32; 2])> {
        self.graph.plugin_peaks(id)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    pub fn connect(&self, group_a: GroupId, port_a: PortId, group_b: GroupId, port_b: PortId) -> Result<ConnectionId> {
        self.ensure_open()?;
        Ok(self.graph.connect(group_a, port_a, group_b, port_b)?)
    }

    /// Connect two ports given as `"group:port"`.
    pub fn connect_by_name(&self, source: &str, target: &str) -> Result<ConnectionId> {
        self.ensure_open()?;
        Ok(self.graph.connect_by_name(source, target)?)
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.disconnect(connection)?)
    }

    /// `(source, target)` full port names of every graph connection.
    pub fn connections(&self) -> Vec<(String, String)> {
        self.graph.connections()
    }

    /// Rebuild the graph's patchbay from its own state.
    pub fn refresh(&self) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.refresh()?)
    }

    // =========================================================================
    // Engine state
    // =========================================================================

    /// New block size from the server. The driver must be resized on the
    /// audio thread when this grows past its capacity.
    pub fn set_buffer_size(&self, frames: usize) -> Result<()> {
        self.ensure_open()?;
        Ok(self.graph.set_buffer_size(frames)?)
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.graph.set_sample_rate(sample_rate);
    }

    pub fn set_offline(&self, offline: bool) {
        self.graph.set_offline(offline);
    }

    // =========================================================================
    // Server side
    // =========================================================================

    /// Handle for audio-server callback threads. Events are applied on the
    /// next [`Self::idle`].
    pub fn notifications(&self) -> ServerNotifications {
        ServerNotifications::new(Arc::clone(&self.drain))
    }

    /// Replay postponed server notifications. Call from the control thread.
    pub fn idle(&self) -> usize {
        if self.closed.get() {
            return 0;
        }
        self.drain.drain(&self.server_directory)
    }

    /// The audio callback driver. Only the first call gets it.
    pub fn driver(&self) -> Option<AudioCallbackDriver> {
        let driver = self.driver.lock().take();
        if driver.is_none() {
            tracing::warn!("Audio callback driver was already taken");
        }
        driver
    }

    /// Control-side handle to the driver's statistics and action queue.
    pub fn driver_handle(&self) -> &DriverHandle {
        &self.driver_handle
    }

    // =========================================================================
    // Canvas positions
    // =========================================================================

    /// Saved positions of graph groups followed by server groups.
    pub fn patchbay_positions(&self) -> Vec<GroupPosition> {
        let mut positions = self.graph.directory().positions();
        positions.extend(self.server_directory.positions());
        positions
    }

    /// Move a group of the graph's patchbay.
    pub fn set_group_position(&self, group: GroupId, x1: i32, y1: i32, x2: i32, y2: i32) -> bool {
        self.graph.directory().set_position(group, x1, y1, x2, y2)
    }

    /// Apply a saved position, looking in the graph first and then among
    /// the server's clients.
    pub fn restore_group_position(&self, position: &GroupPosition) -> Option<GroupId> {
        let prefix = &self.config.client_name_prefix;
        let name = position.restore_name(prefix);
        if self.graph.directory().find_group_id(&name).is_some() {
            return self.graph.directory().restore_position(position, prefix);
        }
        self.server_directory.restore_position(position, prefix)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Remove every plugin and destroy the graph. Returns `false` when the
    /// engine was already closed.
    pub fn close(&self) -> bool {
        if !self.closed.raise() {
            return false;
        }
        if let Err(e) = self.graph.remove_all_plugins(true) {
            tracing::warn!("Closing with plugins still attached: {}", e);
        }
        self.graph.destroy();
        self.server_directory.clear();
        let dropped = self.drain.drain_with(|_| {});
        tracing::info!("Host engine closed, {} notifications dropped", dropped);
        true
    }
}

impl Drop for HostEngine {
    fn drop(&mut self) {
        self.close();
    }
}
