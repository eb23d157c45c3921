//! Tolerance constants for routing tests.

/// Floating point rounding errors (passthrough, unity gain, summing).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Values below this are considered silent (~-80dB).
pub const SILENCE_THRESHOLD: f32 = 0.0001;
