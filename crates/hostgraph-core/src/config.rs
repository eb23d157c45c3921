//! Engine configuration.

use crate::cv::CvMergeTiming;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of the internal routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    /// Fixed 2-in/2-out serial chain.
    #[default]
    Rack,
    /// Arbitrary groups, ports and connections.
    Patchbay,
}

/// Configuration injected by the surrounding engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub process_mode: ProcessMode,
    pub sample_rate: f64,
    /// Frames per block the server is expected to deliver.
    pub buffer_size: usize,
    /// Largest block any buffer is allocated for.
    pub max_buffer_size: usize,
    pub audio_ins: usize,
    pub audio_outs: usize,
    pub cv_ins: usize,
    pub cv_outs: usize,
    pub midi_in: bool,
    pub midi_out: bool,
    /// Freewheel: plugin locks block instead of being try-locked.
    pub offline: bool,
    pub cv_merge_timing: CvMergeTiming,
    /// Bound on waiting for the audio thread to park before a structural change.
    pub runner_stop_timeout: Duration,
    /// Prefix the engine gives its plugin groups (e.g. `"Host.0/"`); empty by default.
    pub client_name_prefix: String,
    pub max_plugins: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_mode: ProcessMode::Rack,
            sample_rate: 48000.0,
            buffer_size: 512,
            max_buffer_size: 4096,
            audio_ins: 2,
            audio_outs: 2,
            cv_ins: 0,
            cv_outs: 0,
            midi_in: true,
            midi_out: true,
            offline: false,
            cv_merge_timing: CvMergeTiming::BlockStart,
            runner_stop_timeout: Duration::from_millis(500),
            client_name_prefix: String::new(),
            max_plugins: 99,
        }
    }
}

impl EngineConfig {
    pub fn rack() -> Self {
        Self::default()
    }

    pub fn patchbay() -> Self {
        Self {
            process_mode: ProcessMode::Patchbay,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer_size must be > 0".into()));
        }
        if self.buffer_size > self.max_buffer_size {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {} exceeds max_buffer_size {}",
                self.buffer_size, self.max_buffer_size
            )));
        }
        if self.process_mode == ProcessMode::Rack && (self.audio_ins != 2 || self.audio_outs != 2) {
            return Err(Error::InvalidConfig(format!(
                "rack mode needs 2 audio ins/outs, got {}/{}",
                self.audio_ins, self.audio_outs
            )));
        }
        if self.max_plugins == 0 {
            return Err(Error::InvalidConfig("max_plugins must be > 0".into()));
        }
        if self.runner_stop_timeout.is_zero() {
            return Err(Error::InvalidConfig("runner_stop_timeout must be > 0".into()));
        }
        Ok(())
    }
}
