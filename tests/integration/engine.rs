//! Engine lifecycle integration tests
//!
//! Creation, configuration, driver hand-off and shutdown.

use crate::helpers::tolerances::FLOAT_EPSILON;
use crate::helpers::*;
use hostgraph::graph::{GraphStatus, SkipReason};
use hostgraph::prelude::*;
use hostgraph::{BlockStatus, Error, ProcessMode};

#[test]
fn test_default_engine_is_stereo_rack() {
    let engine = HostEngine::builder().build().unwrap();
    assert_eq!(engine.mode(), ProcessMode::Rack);
    assert_eq!(engine.graph().status(), GraphStatus::Ready);
    assert_eq!(engine.plugin_count(), 0);

    // rack wiring: 2 audio in, 2 audio out, MIDI in and out
    assert_eq!(engine.connections().len(), 6);
}

#[test]
fn test_close_is_idempotent() {
    let engine = rack_engine();
    engine.add_plugin(Box::new(TestGain::stereo("a", 1.0))).unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("b", 1.0))).unwrap();

    assert!(engine.close());
    assert_eq!(engine.graph().status(), GraphStatus::Destroyed);
    assert_eq!(engine.plugin_count(), 0);

    for _ in 0..3 {
        assert!(!engine.close());
    }
    assert!(!engine.graph().destroy());
}

#[test]
fn test_closed_engine_rejects_changes() {
    let engine = rack_engine();
    engine.close();

    assert!(matches!(
        engine.add_plugin(Box::new(TestGain::stereo("late", 1.0))),
        Err(Error::Closed)
    ));
    assert!(matches!(engine.set_buffer_size(128), Err(Error::Closed)));
    assert_eq!(engine.idle(), 0);
}

#[test]
fn test_driver_after_close_outputs_silence() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine.close();

    let out = run_block(&mut driver, &[1.0, 1.0], 2, 32);
    assert_constant(&out[0], 0.0, FLOAT_EPSILON);
    assert_constant(&out[1], 0.0, FLOAT_EPSILON);

    let status = driver.on_block(&[], &mut [], 32);
    assert_eq!(status, BlockStatus::Skipped(SkipReason::NotReady));
    assert_eq!(engine.driver_handle().stats().blocks_skipped(), 2);
}

#[test]
fn test_dropping_engine_closes_graph() {
    let engine = rack_engine();
    let graph = engine.graph().clone();
    drop(engine);
    assert_eq!(graph.status(), GraphStatus::Destroyed);
}

#[test]
fn test_buffer_size_growth() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("g", 2.0))).unwrap();

    engine.set_buffer_size(1024).unwrap();
    driver.resize(engine.graph().max_frames());
    assert_eq!(driver.max_frames(), 1024);

    let out = run_block(&mut driver, &[0.25, 0.25], 2, 1024);
    assert_constant(&out[0], 0.5, FLOAT_EPSILON);
    assert_constant(&out[1], 0.5, FLOAT_EPSILON);
}

#[test]
fn test_plugin_limit() {
    let engine = HostEngine::builder().max_plugins(2).build().unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("a", 1.0))).unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("b", 1.0))).unwrap();
    let err = engine.add_plugin(Box::new(TestGain::stereo("c", 1.0))).unwrap_err();
    assert!(matches!(err, Error::Graph(_)));
}
