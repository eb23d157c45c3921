//! Atomics shared between the audio thread and the control thread.

use crate::compat::{AtomicBool, Ordering};
use atomic_float::AtomicF32;

/// An `f32` set on one thread and read on others.
#[derive(Debug, Default)]
pub struct AtomicFloat(AtomicF32);

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self(AtomicF32::new(value))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value, Ordering::Release);
    }
}

/// Engine state switch (enabled, offline, closed, transport rolling).
#[derive(Debug, Default)]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    /// Raise the flag. Only the call that actually raised it gets `true`.
    #[inline]
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Input and output peaks of the first two channels.
///
/// The audio thread publishes both pairs once per block; meters read them
/// from anywhere.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct PeakLevels {
    levels: [AtomicF32; 4],
}

impl PeakLevels {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn publish(&self, inputs: [f32; 2], outputs: [f32; 2]) {
        for (level, value) in self.levels.iter().zip(inputs.into_iter().chain(outputs)) {
            level.store(value, Ordering::Relaxed);
        }
    }

    /// `(inputs, outputs)` as last published.
    pub fn get(&self) -> ([f32; 2], [f32; 2]) {
        let level = |i: usize| self.levels[i].load(Ordering::Relaxed);
        ([level(0), level(1)], [level(2), level(3)])
    }

    pub fn reset(&self) {
        self.publish([0.0; 2], [0.0; 2]);
    }
}

/// Absolute peak of a buffer, clamped to 1.0.
#[inline]
pub fn max_normalized(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |peak, s| peak.max(s.abs())).min(1.0)
}
