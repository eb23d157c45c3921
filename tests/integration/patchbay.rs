//! Patchbay mode integration tests
//!
//! Groups and ports mirrored from plugins, connections, naming rules and
//! plugin id allocation.

use crate::helpers::tolerances::{FLOAT_EPSILON, SILENCE_THRESHOLD};
use crate::helpers::*;
use hostgraph::prelude::*;
use hostgraph::Error;
use proptest::prelude::*;
use std::collections::HashSet;

fn group_name(engine: &HostEngine, id: PluginId) -> String {
    let group = engine.graph().plugin_group(id).unwrap();
    engine.directory().group(group).unwrap().name
}

#[test]
fn test_server_groups_are_registered() {
    let engine = patchbay_engine(2, 4, 1);
    let directory = engine.directory();
    for name in ["Audio Input", "Audio Output", "CV Input", "MIDI Input", "MIDI Output"] {
        assert!(directory.find_group_id(name).is_some(), "missing group {}", name);
    }
    assert!(directory.find_group_id("CV Output").is_none());
    assert!(directory.find_port("Audio Output:playback_4").is_valid());
    assert!(directory.find_port("CV Input:cv_capture_1").is_valid());
    assert!(engine.connections().is_empty());
}

#[test]
fn test_plugin_signal_path() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 4.0))).unwrap();

    engine.connect_by_name("Audio Input:capture_2", "amp:in").unwrap();
    engine.connect_by_name("amp:out", "Audio Output:playback_1").unwrap();

    let out = run_block(&mut driver, &[0.5, 0.125], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.5, FLOAT_EPSILON);
    assert!(out[1].iter().all(|s| s.abs() < SILENCE_THRESHOLD));

    assert_eq!(
        engine.connections(),
        vec![
            ("Audio Input:capture_2".to_string(), "amp:in".to_string()),
            ("amp:out".to_string(), "Audio Output:playback_1".to_string()),
        ]
    );
}

#[test]
fn test_fan_in_and_fan_out() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::new("mix", 1, 1, 1.0))).unwrap();

    engine.connect_by_name("Audio Input:capture_1", "mix:in").unwrap();
    engine.connect_by_name("Audio Input:capture_2", "mix:in").unwrap();
    engine.connect_by_name("mix:out", "Audio Output:playback_1").unwrap();
    engine.connect_by_name("mix:out", "Audio Output:playback_2").unwrap();

    let out = run_block(&mut driver, &[0.25, 0.5], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.75, FLOAT_EPSILON);
    assert_constant(&out[1], 0.75, FLOAT_EPSILON);
}

#[test]
fn test_disconnect_stops_signal() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    assert!(matches!(
        engine.connect_by_name("Audio Input:capture_1", "nowhere:in"),
        Err(Error::Graph(_))
    ));

    // server ports can be joined directly
    let direct = engine
        .connect_by_name("Audio Input:capture_2", "Audio Output:playback_2")
        .unwrap();
    let out = run_block(&mut driver, &[0.0, 0.25], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[1], 0.25, FLOAT_EPSILON);
    engine.disconnect(direct).unwrap();

    engine.add_plugin(Box::new(TestGain::new("thru", 1, 1, 1.0))).unwrap();
    engine.connect_by_name("Audio Input:capture_1", "thru:in").unwrap();
    let link = engine.connect_by_name("thru:out", "Audio Output:playback_1").unwrap();

    let out = run_block(&mut driver, &[0.5, 0.0], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.5, FLOAT_EPSILON);

    engine.disconnect(link).unwrap();
    let out = run_block(&mut driver, &[0.5, 0.0], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[0], 0.0, FLOAT_EPSILON);
    assert!(engine.disconnect(link).is_err());
}

#[test]
fn test_connect_by_ids() {
    let engine = patchbay_engine(2, 2, 0);
    engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 1.0))).unwrap();

    let (group_a, port_a) = engine.graph().group_and_port("amp:out").unwrap();
    let (group_b, port_b) = engine.graph().group_and_port("Audio Output:playback_2").unwrap();
    let id = engine.connect(group_a, port_a, group_b, port_b).unwrap();
    assert!(engine.directory().connection(id).is_some());

    // wrong direction
    assert!(engine.connect(group_b, port_b, group_a, port_a).is_err());
}

#[test]
fn test_rename_updates_group_and_ports() {
    let engine = patchbay_engine(2, 2, 0);
    let id = engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 1.0))).unwrap();
    engine.connect_by_name("Audio Input:capture_1", "amp:in").unwrap();

    assert_eq!(engine.rename_plugin(id, "lead").unwrap(), "lead");
    assert!(engine.directory().find_port("lead:in").is_valid());
    assert!(!engine.directory().find_port("amp:in").is_valid());
    assert_eq!(
        engine.connections(),
        vec![("Audio Input:capture_1".to_string(), "lead:in".to_string())]
    );
}

#[test]
fn test_refresh_keeps_connections() {
    let engine = patchbay_engine(2, 2, 0);
    let mut driver = engine.driver().unwrap();
    engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 2.0))).unwrap();
    engine.connect_by_name("Audio Input:capture_1", "amp:in").unwrap();
    engine.connect_by_name("amp:out", "Audio Output:playback_2").unwrap();
    let before = engine.connections();

    engine.refresh().unwrap();
    assert_eq!(engine.connections(), before);

    let out = run_block(&mut driver, &[0.25, 0.0], 2, TEST_BUFFER_SIZE);
    assert_constant(&out[1], 0.5, FLOAT_EPSILON);
}

#[test]
fn test_remove_plugin_drops_group_and_connections() {
    let engine = patchbay_engine(2, 2, 0);
    let id = engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 1.0))).unwrap();
    engine.connect_by_name("Audio Input:capture_1", "amp:in").unwrap();
    engine.connect_by_name("amp:out", "Audio Output:playback_1").unwrap();

    engine.remove_plugin(id).unwrap();
    assert!(engine.directory().find_group_id("amp").is_none());
    assert!(engine.connections().is_empty());
    assert!(engine.remove_plugin(id).is_err());
}

#[test]
fn test_positions_survive_serialization() {
    let engine = patchbay_engine(2, 2, 0);
    let id = engine.add_plugin(Box::new(TestGain::new("amp", 1, 1, 1.0))).unwrap();
    let group = engine.graph().plugin_group(id).unwrap();
    assert!(engine.set_group_position(group, 10, 20, 210, 120));

    let saved = engine.patchbay_positions();
    let json = serde_json::to_string(&saved).unwrap();
    let loaded: Vec<GroupPosition> = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded[0].coordinates(), "10:20:210:120");

    // a session saved by another engine instance carries its client prefix
    let mut foreign = loaded[0].clone();
    foreign.name = format!("host.3/{}", foreign.name);
    foreign.x1 = 50;
    assert_eq!(engine.restore_group_position(&foreign), Some(group));
    let position = engine.directory().group(group).unwrap().position.unwrap();
    assert_eq!(position.x1, 50);
}

#[test]
fn test_coordinate_strings() -> hostgraph::Result<()> {
    let mut position = GroupPosition::new("Audio Input", 0, 0, 0, 0);
    position.set_coordinates("1:-2:3:4")?;
    assert_eq!((position.x1, position.y1, position.x2, position.y2), (1, -2, 3, 4));
    assert!(position.set_coordinates("1:2:x:4").is_err());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_group_names_are_unique(names in prop::collection::vec("(amp|amp \\([2-3]\\)|synth)", 1..12)) {
        let engine = patchbay_engine(2, 2, 0);
        let mut seen = HashSet::new();
        for name in &names {
            let id = engine.add_plugin(Box::new(TestGain::new(name, 1, 1, 1.0))).unwrap();
            let group = group_name(&engine, id);
            prop_assert!(seen.insert(group.clone()), "duplicate group {}", group);

            // the plugin carries the name it was registered under
            let slot = engine.graph().plugin(id).unwrap();
            prop_assert_eq!(slot.try_name(), Some(group.clone()));
            let input = format!("{}:in", group);
            prop_assert!(engine.directory().find_port(&input).is_valid());
        }
    }

    #[test]
    fn prop_plugin_ids_never_repeat(ops in prop::collection::vec(any::<bool>(), 1..40)) {
        let engine = rack_engine();
        let mut issued: Vec<PluginId> = Vec::new();
        for add in ops {
            let live = engine.plugin_ids();
            if add || live.is_empty() {
                let id = engine.add_plugin(Box::new(TestGain::stereo("p", 1.0))).unwrap();
                if let Some(last) = issued.last() {
                    prop_assert!(id.0 > last.0);
                }
                issued.push(id);
            } else {
                engine.remove_plugin(live[0]).unwrap();
            }
        }
        let live: HashSet<PluginId> = engine.plugin_ids().into_iter().collect();
        prop_assert!(live.iter().all(|id| issued.contains(id)));
    }
}
