//! CV-as-event merging.
//!
//! A [`CvSourceMerger`] samples a set of CV inputs once per block and turns
//! value changes into `Parameter` control events on the plugin's event input.
//!
//! # RT Safety
//!
//! [`CvSourceMerger::merge_into`] only ever try-locks the source list. When the
//! control thread holds the lock (adding or removing a source) the block is
//! skipped: no events, no waiting.

use crate::audio::AudioBlock;
use crate::compat::{Arc, Mutex, Weak};
use crate::event::{ControlEvent, EngineEvent, EventBuffer, NON_MIDI_CHANNEL};
use crate::plugin::PluginId;
use crate::port::{CvPort, CvRange};
use serde::{Deserialize, Serialize};

/// Maximum CV sources per client.
pub const MAX_CV_SOURCES: usize = 32;

/// Which frame of the block a CV source is sampled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CvMergeTiming {
    /// Frame 0; events go in front of all other events of the block.
    #[default]
    BlockStart,
    /// Frame of the most recent event already in the buffer (clamped to the
    /// block); events are appended. Nothing is merged into a full buffer.
    LastEvent,
}

/// Receiver of CV source count changes, implemented by the routing graph.
pub trait CvReconfigure: Send + Sync {
    fn reconfigure_for_cv(&self, plugin: PluginId, cv_index: usize, added: bool);
}

#[derive(Debug)]
struct CvSource {
    index_offset: u32,
    range: Arc<CvRange>,
    /// NaN until the first sample, so the first block always reports.
    previous: f32,
}

/// Per-client set of CV inputs merged into the event stream.
pub struct CvSourceMerger {
    sources: Mutex<Vec<CvSource>>,
    timing: CvMergeTiming,
    target: Mutex<Option<(Weak<dyn CvReconfigure>, PluginId)>>,
}

impl CvSourceMerger {
    pub fn new(timing: CvMergeTiming) -> Self {
        Self {
            sources: Mutex::new(Vec::with_capacity(MAX_CV_SOURCES)),
            timing,
            target: Mutex::new(None),
        }
    }

    pub fn timing(&self) -> CvMergeTiming {
        self.timing
    }

    /// Attach the graph node that must follow source count changes.
    pub fn set_graph(&self, graph: Weak<dyn CvReconfigure>, plugin: PluginId) {
        *self.target.lock() = Some((graph, plugin));
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Register an input CV port as a source tagged with `index_offset`.
    ///
    /// With `reconfigure_now` the attached graph node is told to grow its CV
    /// input count right away.
    pub fn add_source(&self, port: &CvPort, index_offset: u32, reconfigure_now: bool) -> bool {
        if !port.meta().is_input {
            tracing::warn!("CV source '{}' is not an input", port.meta().name);
            return false;
        }

        let cv_index = {
            let mut sources = self.sources.lock();
            if sources.len() >= MAX_CV_SOURCES {
                tracing::warn!("CV source limit ({}) reached", MAX_CV_SOURCES);
                return false;
            }
            sources.push(CvSource {
                index_offset,
                range: port.range_handle(),
                previous: f32::NAN,
            });
            sources.len() - 1
        };

        if reconfigure_now {
            self.reconfigure(cv_index, true);
        }
        true
    }

    /// Remove the most recently added source with `index_offset`.
    pub fn remove_source(&self, index_offset: u32) -> bool {
        let removed = {
            let mut sources = self.sources.lock();
            match sources.iter().rposition(|s| s.index_offset == index_offset) {
                Some(i) => {
                    sources.remove(i);
                    Some(i)
                }
                None => None,
            }
        };

        match removed {
            Some(cv_index) => {
                self.reconfigure(cv_index, false);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.sources.lock().clear();
    }

    fn reconfigure(&self, cv_index: usize, added: bool) {
        let target = self.target.lock().clone();
        if let Some((graph, plugin)) = target {
            if let Some(graph) = graph.upgrade() {
                graph.reconfigure_for_cv(plugin, cv_index, added);
            }
        }
    }

    /// Sample every source and append change events to `events`.
    ///
    /// Source `i` reads channel `first_channel + i` of `buffers`. Returns the
    /// number of events written; 0 when the source list is busy.
    pub fn merge_into(
        &self,
        buffers: &AudioBlock,
        first_channel: usize,
        frames: usize,
        events: &mut EventBuffer,
    ) -> usize {
        let Some(mut sources) = self.sources.try_lock() else {
            return 0;
        };
        if sources.is_empty() || frames == 0 {
            return 0;
        }

        let frame = match self.timing {
            CvMergeTiming::BlockStart => 0,
            CvMergeTiming::LastEvent => {
                if events.is_full() {
                    return 0;
                }
                events
                    .last()
                    .map(|e| (e.time as usize).min(frames - 1))
                    .unwrap_or(0)
            }
        };

        let mut written = 0;
        for (i, source) in sources.iter_mut().enumerate() {
            let Some(&value) = buffers.channel(first_channel + i).get(frame) else {
                continue;
            };
            if (value - source.previous).abs() < f32::EPSILON {
                continue;
            }

            let param = source.index_offset.min(u16::MAX as u32) as u16;
            let ctrl = ControlEvent::parameter(param, source.range.normalize(value));
            let event = EngineEvent::control(frame as u32, NON_MIDI_CHANNEL, ctrl);

            let ok = match self.timing {
                CvMergeTiming::BlockStart => events.insert(written, event),
                CvMergeTiming::LastEvent => events.push(event),
            };
            if !ok {
                break;
            }
            source.previous = value;
            written += 1;
        }
        written
    }
}

impl Default for CvSourceMerger {
    fn default() -> Self {
        Self::new(CvMergeTiming::default())
    }
}

impl core::fmt::Debug for CvSourceMerger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CvSourceMerger")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
