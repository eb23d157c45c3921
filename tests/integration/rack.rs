//! Rack mode integration tests
//!
//! Serial chain semantics, bypass, ordering and lock contention.

use crate::helpers::tolerances::{FLOAT_EPSILON, SILENCE_THRESHOLD};
use crate::helpers::*;
use approx::assert_relative_eq;
use hostgraph::prelude::*;
use hostgraph::BlockStatus;

#[test]
fn test_empty_rack_is_bypass() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();

    let out = run_block(&mut driver, &[0.5, -0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.5, FLOAT_EPSILON);
    assert_constant(&out[1], -0.25, FLOAT_EPSILON);
}

#[test]
fn test_chain_multiplies_in_order() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("double", 2.0))).unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("triple", 3.0))).unwrap();

    let out = run_block(&mut driver, &[0.1, 0.2], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.6, FLOAT_EPSILON);
    assert_constant(&out[1], 1.2, FLOAT_EPSILON);
}

#[test]
fn test_mono_output_feeds_both_channels() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::new("mono", 1, 1, 2.0))).unwrap();

    let out = run_block(&mut driver, &[0.5, 0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 1.0, FLOAT_EPSILON);
    assert_constant(&out[1], 1.0, FLOAT_EPSILON);
}

#[test]
fn test_generator_mixes_chain_input() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::new("dc", 0, 2, 0.5))).unwrap();

    let out = run_block(&mut driver, &[0.25, -0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.75, FLOAT_EPSILON);
    assert_constant(&out[1], 0.25, FLOAT_EPSILON);
}

#[test]
fn test_switch_changes_chain_order() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    let dc = engine.add_plugin(Box::new(TestGain::new("dc", 0, 2, 0.5))).unwrap();
    let gain = engine.add_plugin(Box::new(TestGain::stereo("gain", 2.0))).unwrap();

    // (in + 0.5) * 2
    let out = run_block(&mut driver, &[0.25, 0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 1.5, FLOAT_EPSILON);

    engine.switch_plugins(dc, gain).unwrap();
    assert_eq!(engine.plugin_ids(), vec![gain, dc]);

    // in * 2 + 0.5
    let out = run_block(&mut driver, &[0.25, 0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 1.0, FLOAT_EPSILON);
}

#[test]
fn test_busy_plugin_is_bypassed() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    let id = engine.add_plugin(Box::new(TestGain::stereo("busy", 4.0))).unwrap();
    let slot = engine.graph().plugin(id).unwrap();

    {
        let _held = slot.lock();
        let out = run_block(&mut driver, &[0.5, 0.5], 2, TEST_BUFFER_SIZE);
        assert_constant(&out[0], 0.5, FLOAT_EPSILON);
    }
    let state = engine.graph().plugin_state(id).unwrap();
    assert_eq!(state.skipped_blocks(), 1);
    assert_eq!(engine.driver_handle().stats().plugins_skipped(), 1);

    let out = run_block(&mut driver, &[0.5, 0.5], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 2.0, FLOAT_EPSILON);
    assert_eq!(state.skipped_blocks(), 1);
}

#[test]
fn test_offline_waits_for_plugin_lock() {
    let engine = HostEngine::builder()
        .buffer_size(TEST_BUFFER_SIZE)
        .max_buffer_size(TEST_MAX_BUFFER_SIZE)
        .offline(true)
        .build()
        .unwrap();
    let mut driver = engine.driver().unwrap();
    let id = engine.add_plugin(Box::new(TestGain::stereo("slow", 2.0))).unwrap();
    let slot = engine.graph().plugin(id).unwrap();

    let held = slot.lock();
    let worker = std::thread::spawn(move || run_block(&mut driver, &[0.5, 0.5], 2, TEST_BUFFER_SIZE));
    std::thread::sleep(std::time::Duration::from_millis(20));
    drop(held);

    let out = worker.join().unwrap();
    assert_constant(&out[0], 1.0, FLOAT_EPSILON);
}

#[test]
fn test_disabled_plugin_is_bypassed() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    let id = engine.add_plugin(Box::new(TestGain::stereo("off", 0.0))).unwrap();
    engine.graph().plugin(id).unwrap().set_enabled(false);

    let out = run_block(&mut driver, &[0.3, 0.3], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.3, FLOAT_EPSILON);
}

#[test]
fn test_plugin_peaks_follow_the_chain() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    let id = engine.add_plugin(Box::new(TestGain::stereo("half", 0.5))).unwrap();

    run_block(&mut driver, &[0.8, -0.4], 2, TEST_BUFFER_SIZE);
    let (inputs, outputs) = engine.plugin_peaks(id).unwrap();
    assert_relative_eq!(inputs[0], 0.8, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(inputs[1], 0.4, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(outputs[0], 0.4, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(outputs[1], 0.2, epsilon = FLOAT_EPSILON);

    let (master_in, master_out) = engine.driver_handle().stats().master_peaks();
    assert_relative_eq!(master_in[0], 0.8, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(master_out[1], 0.2, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_removed_plugin_leaves_chain() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    let mute = engine.add_plugin(Box::new(TestGain::stereo("mute", 0.0))).unwrap();

    let out = run_block(&mut driver, &[0.5, 0.5], 2, TEST_BUFFER_SIZE);
    assert!(out[0].iter().all(|s| s.abs() < SILENCE_THRESHOLD));

    engine.remove_plugin(mute).unwrap();
    let out = run_block(&mut driver, &[0.5, 0.5], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.5, FLOAT_EPSILON);
}

#[test]
fn test_structural_change_while_block_runs() {
    let engine = HostEngine::builder()
        .runner_stop_timeout(std::time::Duration::from_millis(10))
        .build()
        .unwrap();
    let graph = engine.graph().clone();

    // a block in flight holds the runner
    let guard = graph.runner().enter().unwrap();
    assert!(engine.add_plugin(Box::new(TestGain::stereo("late", 1.0))).is_err());
    drop(guard);
    assert!(engine.add_plugin(Box::new(TestGain::stereo("late", 1.0))).is_ok());

    let mut driver = engine.driver().unwrap();
    let status = driver.on_block(&[], &mut [], 16);
    assert!(matches!(status, BlockStatus::Processed(r) if r.plugins_processed == 1));
}
