//! Channel-major sample storage handed to plugins once per block.

/// A set of equally sized channels backed by one allocation.
///
/// Capacity (channels and frames) is fixed at construction; the active
/// channel and frame counts may shrink and grow within it without allocating.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    data: Vec<f32>,
    channel_capacity: usize,
    channels: usize,
    max_frames: usize,
    frames: usize,
}

impl AudioBlock {
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Self::with_channel_capacity(channels, channels, max_frames)
    }

    /// Reserve room for `capacity` channels with `channels` active.
    pub fn with_channel_capacity(channels: usize, capacity: usize, max_frames: usize) -> Self {
        let capacity = capacity.max(channels);
        Self {
            data: vec![0.0; capacity * max_frames],
            channel_capacity: capacity,
            channels,
            max_frames,
            frames: max_frames,
        }
    }

    /// A block with no channels, for plugins without audio or CV.
    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Set the active frame count, clamped to the capacity.
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.max_frames);
    }

    /// Set the active channel count. Fails beyond the reserved capacity.
    pub fn set_channels(&mut self, channels: usize) -> bool {
        if channels > self.channel_capacity {
            return false;
        }
        self.channels = channels;
        true
    }

    /// Active frames of channel `index`; empty when out of range.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        if index >= self.channels {
            return &[];
        }
        let start = index * self.max_frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        if index >= self.channels {
            return &mut [];
        }
        let start = index * self.max_frames;
        &mut self.data[start..start + self.frames]
    }

    /// Zero the active frames of every active channel.
    pub fn clear(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Overwrite channel `index` with `source` (shorter source leaves the tail untouched).
    pub fn copy_channel(&mut self, index: usize, source: &[f32]) {
        let dest = self.channel_mut(index);
        let n = dest.len().min(source.len());
        dest[..n].copy_from_slice(&source[..n]);
    }

    /// Overwrite channel `to` with channel `from`.
    pub fn duplicate_channel(&mut self, from: usize, to: usize) {
        if from == to || from >= self.channels || to >= self.channels {
            return;
        }
        let start = from * self.max_frames;
        self.data
            .copy_within(start..start + self.frames, to * self.max_frames);
    }

    /// Mix `source` into channel `index`.
    pub fn add_channel(&mut self, index: usize, source: &[f32]) {
        let dest = self.channel_mut(index);
        for (d, s) in dest.iter_mut().zip(source) {
            *d += *s;
        }
    }
}

impl Default for AudioBlock {
    fn default() -> Self {
        Self::empty()
    }
}
