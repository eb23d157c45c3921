//! Event routing integration tests
//!
//! MIDI through the rack and the patchbay, event ordering, CV sources
//! turned into parameter events, and the panic action.

use crate::helpers::*;
use approx::assert_relative_eq;
use hostgraph::core::{MIDI_CHANNEL_COUNT, NON_MIDI_CHANNEL};
use hostgraph::prelude::*;
use hostgraph::{ControlEvent, ControlKind};

fn patchbay_thru(engine: &HostEngine) -> PluginId {
    let id = engine
        .add_plugin(Box::new(TestGain::new("thru", 1, 1, 1.0).with_midi()))
        .unwrap();
    engine
        .connect_by_name("MIDI Input:midi_capture", "thru:events-in")
        .unwrap();
    engine
        .connect_by_name("thru:events-out", "MIDI Output:midi_playback")
        .unwrap();
    id
}

#[test]
fn test_events_leave_in_time_order() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    patchbay_thru(&engine);

    let input = driver.events_in_mut();
    assert!(input.push(EngineEvent::control(30, 0, ControlEvent::parameter(0, 0.0))));
    assert!(input.push(EngineEvent::control(5, 0, ControlEvent::parameter(1, 0.1))));
    assert!(input.push(EngineEvent::control(12, 0, ControlEvent::parameter(3, 0.3))));
    assert!(input.push(EngineEvent::control(5, 0, ControlEvent::parameter(2, 0.2))));
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);

    let out: Vec<(u32, u16)> = driver
        .events_out()
        .iter()
        .map(|e| (e.time, e.as_control().map(|c| c.param).unwrap_or(u16::MAX)))
        .collect();
    assert_eq!(out, vec![(5, 1), (5, 2), (12, 3), (30, 0)]);

    // input is consumed by the block
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);
    assert!(driver.events_out().is_empty());
}

#[test]
fn test_raw_midi_passes_through_patchbay() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    patchbay_thru(&engine);

    assert!(driver.events_in_mut().push_midi(7, 2, 0, &[0x92, 60, 100]));
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);

    let events = driver.events_out();
    assert_eq!(events.len(), 1);
    let event = events.get(0).copied().unwrap();
    assert_eq!((event.time, event.channel), (7, 2));
    let midi = event.as_midi().unwrap();
    assert_eq!(events.midi_bytes(midi), &[0x92, 60, 100]);
}

#[test]
fn test_empty_rack_drops_midi() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();

    driver
        .events_in_mut()
        .push(EngineEvent::control(0, 0, ControlEvent::parameter(1, 0.5)));
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);
    assert!(driver.events_out().is_empty());
}

#[test]
fn test_rack_midi_passes_plugins_without_midi_out() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine
        .add_plugin(Box::new(TestGain::stereo("thru", 1.0).with_midi()))
        .unwrap();
    engine.add_plugin(Box::new(TestGain::stereo("deaf", 1.0))).unwrap();

    driver
        .events_in_mut()
        .push(EngineEvent::control(3, 1, ControlEvent::parameter(9, 0.5)));
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);

    let events = driver.events_out();
    assert_eq!(events.len(), 1);
    assert_eq!(events.get(0).and_then(|e| e.as_control()).map(|c| c.param), Some(9));
}

#[test]
fn test_panic_reaches_every_channel() {
    let engine = rack_engine();
    let mut driver = engine.driver().unwrap();
    engine
        .add_plugin(Box::new(TestGain::stereo("thru", 1.0).with_midi()))
        .unwrap();

    assert!(engine.driver_handle().all_notes_off());
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);

    let events = driver.events_out();
    assert_eq!(events.len(), MIDI_CHANNEL_COUNT as usize);
    let mut channels: Vec<u8> = events.iter().map(|e| e.channel).collect();
    channels.sort_unstable();
    assert_eq!(channels, (0..MIDI_CHANNEL_COUNT).collect::<Vec<_>>());
    assert!(events
        .iter()
        .all(|e| e.time == 0 && e.as_control().map(|c| c.kind) == Some(ControlKind::AllNotesOff)));
}

#[test]
fn test_cv_source_becomes_parameter_event() {
    let engine = patchbay_engine(2, 2, 1);
    let mut driver = engine.driver().unwrap();
    let id = engine
        .add_plugin(Box::new(TestGain::new("mod", 1, 1, 1.0).with_midi()))
        .unwrap();

    let slot = engine.graph().plugin(id).unwrap();
    {
        let mut plugin = slot.lock();
        let client = plugin.engine_client_mut();
        let handle = client.add_port(PortKind::Cv, "mod-cv", true).unwrap();
        assert!(client.set_cv_range(handle, 0.0, 1.0));
        assert!(client.add_cv_source(handle, 5, true));
    }
    assert!(engine.directory().find_port("mod:cv-source-1").is_valid());

    engine
        .connect_by_name("CV Input:cv_capture_1", "mod:cv-source-1")
        .unwrap();
    engine
        .connect_by_name("mod:events-out", "MIDI Output:midi_playback")
        .unwrap();

    driver.cv_in_mut().channel_mut(0).fill(0.5);
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);

    let events = driver.events_out();
    assert_eq!(events.len(), 1);
    let event = events.get(0).copied().unwrap();
    assert_eq!(event.channel, NON_MIDI_CHANNEL);
    let ctrl = event.as_control().unwrap();
    assert_eq!(ctrl.kind, ControlKind::Parameter);
    assert_eq!(ctrl.param, 5);
    assert_relative_eq!(ctrl.normalized, 0.5, epsilon = 1e-6);

    // unchanged CV sends nothing
    driver.on_block(&[], &mut [], TEST_BUFFER_SIZE);
    assert!(driver.events_out().is_empty());

    // removing the source drops its port and connection
    assert!(slot.lock().engine_client_mut().remove_cv_source(5));
    assert!(!engine.directory().find_port("mod:cv-source-1").is_valid());
    assert_eq!(engine.connections().len(), 1);
}
