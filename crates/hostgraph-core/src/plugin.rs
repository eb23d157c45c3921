//! The plugin interface consumed by the routing graph.

use crate::audio::AudioBlock;
use crate::client::ClientPortRegistry;
use crate::compat::{Mutex, MutexGuard};
use crate::lockfree::AtomicFlag;
use crate::port::PortKind;
use crate::shared::{host_globals, HostGlobals, SharedLease};
use serde::{Deserialize, Serialize};

/// Stable identifier of a hosted plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginId(pub u32);

impl core::fmt::Display for PluginId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hosted plugin instance.
///
/// Port counts default to the sizes of the client's port lists.
pub trait Plugin: Send {
    fn engine_client(&self) -> &ClientPortRegistry;
    fn engine_client_mut(&mut self) -> &mut ClientPortRegistry;

    /// Process one block. Input blocks hold `frames` valid frames; output
    /// blocks are zeroed before the call.
    fn process(
        &mut self,
        audio_in: &AudioBlock,
        audio_out: &mut AudioBlock,
        cv_in: &AudioBlock,
        cv_out: &mut AudioBlock,
        frames: usize,
    );

    fn name(&self) -> &str {
        self.engine_client().name()
    }

    /// Bind every port to the coming block.
    fn init_buffers(&mut self, frames: usize) {
        self.engine_client_mut().init_buffers(frames);
    }

    fn audio_in_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Audio, true)
    }

    fn audio_out_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Audio, false)
    }

    fn cv_in_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Cv, true)
    }

    fn cv_out_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Cv, false)
    }

    fn midi_in_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Event, true)
    }

    fn midi_out_count(&self) -> u32 {
        self.engine_client().port_count(PortKind::Event, false)
    }

    fn latency(&self) -> u32 {
        self.engine_client().latency()
    }
}

/// Port counts captured when a plugin is inserted into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortCounts {
    pub audio_ins: usize,
    pub audio_outs: usize,
    pub cv_ins: usize,
    pub cv_outs: usize,
    pub midi_ins: usize,
    pub midi_outs: usize,
}

impl PortCounts {
    pub fn of(plugin: &dyn Plugin) -> Self {
        Self {
            audio_ins: plugin.audio_in_count() as usize,
            audio_outs: plugin.audio_out_count() as usize,
            cv_ins: plugin.cv_in_count() as usize,
            cv_outs: plugin.cv_out_count() as usize,
            midi_ins: plugin.midi_in_count() as usize,
            midi_outs: plugin.midi_out_count() as usize,
        }
    }
}

/// A plugin shared between the control thread and the audio thread.
///
/// The mutex serializes reconfiguration against processing. The audio thread
/// only try-locks it, unless the engine runs offline.
pub struct PluginSlot {
    id: PluginId,
    enabled: AtomicFlag,
    plugin: Mutex<Box<dyn Plugin>>,
    _globals: SharedLease<HostGlobals>,
}

impl PluginSlot {
    pub fn new(id: PluginId, plugin: Box<dyn Plugin>) -> Self {
        Self {
            id,
            enabled: AtomicFlag::new(true),
            plugin: Mutex::new(plugin),
            _globals: host_globals().acquire(),
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Lock for processing. Blocks only when `force_if_offline` is set.
    #[inline]
    pub fn try_lock(&self, force_if_offline: bool) -> Option<MutexGuard<'_, Box<dyn Plugin>>> {
        if force_if_offline {
            Some(self.plugin.lock())
        } else {
            self.plugin.try_lock()
        }
    }

    /// Blocking lock for control-thread reconfiguration.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Plugin>> {
        self.plugin.lock()
    }

    /// Name of the plugin, or `None` while it is locked elsewhere.
    pub fn try_name(&self) -> Option<String> {
        self.plugin.try_lock().map(|p| p.name().to_owned())
    }
}

impl core::fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginSlot")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
