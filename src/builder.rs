//! Builder for configuring and constructing a `HostEngine`.

use crate::{HostEngine, Result};
use hostgraph_core::compat::Arc;
use hostgraph_core::{CvMergeTiming, EngineConfig, ProcessMode};
use hostgraph_patchbay::{NotificationSink, NullSink, TransportSource};
use std::time::Duration;

/// Rack mode is the default; it always runs with two audio inputs and
/// outputs, whatever was requested.
///
/// # Example
///
/// ```ignore
/// use hostgraph::prelude::*;
///
/// let engine = HostEngine::builder()
///     .patchbay()
///     .audio_ins(4)
///     .audio_outs(4)
///     .buffer_size(256)
///     .build()?;
///
/// let driver = engine.driver().expect("driver taken once");
/// ```
pub struct HostEngineBuilder {
    config: EngineConfig,
    sink: Arc<dyn NotificationSink>,
    transport: Option<Arc<dyn TransportSource>>,
}

impl Default for HostEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            sink: Arc::new(NullSink),
            transport: None,
        }
    }
}

impl HostEngineBuilder {
    /// Start from a complete configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rack(mut self) -> Self {
        self.config.process_mode = ProcessMode::Rack;
        self
    }

    pub fn patchbay(mut self) -> Self {
        self.config.process_mode = ProcessMode::Patchbay;
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 512
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.config.buffer_size = frames;
        self
    }

    /// Default: 4096
    pub fn max_buffer_size(mut self, frames: usize) -> Self {
        self.config.max_buffer_size = frames;
        self
    }

    /// Patchbay only. Default: 2
    pub fn audio_ins(mut self, count: usize) -> Self {
        self.config.audio_ins = count;
        self
    }

    /// Patchbay only. Default: 2
    pub fn audio_outs(mut self, count: usize) -> Self {
        self.config.audio_outs = count;
        self
    }

    pub fn cv_ins(mut self, count: usize) -> Self {
        self.config.cv_ins = count;
        self
    }

    pub fn cv_outs(mut self, count: usize) -> Self {
        self.config.cv_outs = count;
        self
    }

    pub fn midi(mut self, input: bool, output: bool) -> Self {
        self.config.midi_in = input;
        self.config.midi_out = output;
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.config.offline = offline;
        self
    }

    pub fn cv_merge_timing(mut self, timing: CvMergeTiming) -> Self {
        self.config.cv_merge_timing = timing;
        self
    }

    /// How long structural changes wait for the audio thread. Default: 500ms
    pub fn runner_stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.runner_stop_timeout = timeout;
        self
    }

    /// Prepended to group names when restoring saved canvas positions.
    pub fn client_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.client_name_prefix = prefix.into();
        self
    }

    /// Default: 99
    pub fn max_plugins(mut self, count: usize) -> Self {
        self.config.max_plugins = count;
        self
    }

    /// Receiver of patchbay topology changes.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Transport queried by the driver at the start of every block.
    pub fn transport(mut self, source: Arc<dyn TransportSource>) -> Self {
        self.transport = Some(source);
        self
    }

    pub fn build(mut self) -> Result<HostEngine> {
        if self.config.process_mode == ProcessMode::Rack
            && (self.config.audio_ins != 2 || self.config.audio_outs != 2)
        {
            tracing::warn!(
                "Rack mode runs stereo, ignoring {} audio ins / {} audio outs",
                self.config.audio_ins,
                self.config.audio_outs
            );
            self.config.audio_ins = 2;
            self.config.audio_outs = 2;
        }
        self.config.validate()?;
        HostEngine::from_parts(self.config, self.sink, self.transport)
    }
}
