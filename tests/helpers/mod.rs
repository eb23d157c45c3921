//! Test helpers and fixtures for hostgraph integration tests
//!
//! - test plugins with predictable output
//! - engines configured for deterministic block-by-block driving
//! - buffer helpers for running one server callback
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use hostgraph::prelude::*;
use hostgraph::EventBuffer;

/// Standard buffer size for deterministic testing
pub const TEST_BUFFER_SIZE: usize = 64;

/// Largest block the test engines accept
pub const TEST_MAX_BUFFER_SIZE: usize = 256;

/// Route engine logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Rack engine with small buffers.
pub fn rack_engine() -> HostEngine {
    HostEngine::builder()
        .buffer_size(TEST_BUFFER_SIZE)
        .max_buffer_size(TEST_MAX_BUFFER_SIZE)
        .build()
        .expect("Failed to create rack engine")
}

/// Patchbay engine with the given server shape.
pub fn patchbay_engine(audio_ins: usize, audio_outs: usize, cv_ins: usize) -> HostEngine {
    HostEngine::builder()
        .patchbay()
        .audio_ins(audio_ins)
        .audio_outs(audio_outs)
        .cv_ins(cv_ins)
        .buffer_size(TEST_BUFFER_SIZE)
        .max_buffer_size(TEST_MAX_BUFFER_SIZE)
        .build()
        .expect("Failed to create patchbay engine")
}

/// Run one block with each input channel held at a constant value.
/// Returns the output channels.
pub fn run_block(driver: &mut AudioCallbackDriver, inputs: &[f32], outputs: usize, frames: usize) -> Vec<Vec<f32>> {
    let inputs: Vec<Vec<f32>> = inputs.iter().map(|&v| vec![v; frames]).collect();
    let input_refs: Vec<&[f32]> = inputs.iter().map(Vec::as_slice).collect();
    let mut out = vec![vec![0.0f32; frames]; outputs];
    {
        let mut out_refs: Vec<&mut [f32]> = out.iter_mut().map(Vec::as_mut_slice).collect();
        driver.on_block(&input_refs, &mut out_refs, frames);
    }
    out
}

/// Check every sample of `channel` equals `expected` within `tolerance`.
pub fn assert_constant(channel: &[f32], expected: f32, tolerance: f32) {
    for (i, &sample) in channel.iter().enumerate() {
        assert!(
            (sample - expected).abs() <= tolerance,
            "sample {} is {}, expected {}",
            i,
            sample,
            expected
        );
    }
}

/// Scales its inputs by a fixed gain. Output `n` reads input `n % ins`;
/// with no inputs the outputs hold the gain itself.
pub struct TestGain {
    client: ClientPortRegistry,
    ins: usize,
    outs: usize,
    gain: f32,
    midi: bool,
}

impl TestGain {
    pub fn new(name: &str, ins: usize, outs: usize, gain: f32) -> Self {
        let mut client = ClientPortRegistry::new(name, 4096);
        for _ in 0..ins {
            client.add_port(PortKind::Audio, "in", true);
        }
        for _ in 0..outs {
            client.add_port(PortKind::Audio, "out", false);
        }
        Self {
            client,
            ins,
            outs,
            gain,
            midi: false,
        }
    }

    pub fn stereo(name: &str, gain: f32) -> Self {
        Self::new(name, 2, 2, gain)
    }

    /// Add "events-in"/"events-out"; events pass straight through.
    pub fn with_midi(mut self) -> Self {
        self.client.add_port(PortKind::Event, "events-in", true);
        self.client.add_port(PortKind::Event, "events-out", false);
        self.midi = true;
        self
    }
}

impl Plugin for TestGain {
    fn engine_client(&self) -> &ClientPortRegistry {
        &self.client
    }

    fn engine_client_mut(&mut self) -> &mut ClientPortRegistry {
        &mut self.client
    }

    fn process(
        &mut self,
        audio_in: &AudioBlock,
        audio_out: &mut AudioBlock,
        _cv_in: &AudioBlock,
        _cv_out: &mut AudioBlock,
        frames: usize,
    ) {
        for ch in 0..self.outs {
            let out = &mut audio_out.channel_mut(ch)[..frames];
            if self.ins == 0 {
                out.fill(self.gain);
                continue;
            }
            for (o, i) in out.iter_mut().zip(audio_in.channel(ch % self.ins)) {
                *o = *i * self.gain;
            }
        }

        if self.midi {
            let input: Option<EventBuffer> = self.client.default_event_in().map(|p| p.buffer().clone());
            if let (Some(input), Some(out)) = (input, self.client.default_event_out_mut()) {
                out.buffer_mut().copy_from(&input);
            }
        }
    }
}
