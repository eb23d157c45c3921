//! Server notification integration tests
//!
//! Server callback threads postpone events; the control thread replays them
//! into the server directory on `idle()`.

use crate::helpers::*;
use hostgraph::patchbay::{PatchbayNotification, PortFlags};
use hostgraph::prelude::*;
use hostgraph::PortId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 4;
const PORTS_PER_THREAD: usize = 250;

#[test]
fn test_concurrent_postpone_while_draining() {
    init_tracing();
    let engine = rack_engine();
    let done = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let server = engine.notifications();
            thread::spawn(move || {
                for p in 0..PORTS_PER_THREAD {
                    let short = format!("out_{}", p);
                    server.port_registered(&short, &format!("client-{}:{}", t, short), PortFlags::AUDIO);
                }
            })
        })
        .collect();

    let watcher = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut drained = 0;
    while !done.load(Ordering::SeqCst) {
        drained += engine.idle();
        thread::yield_now();
    }
    watcher.join().unwrap();
    drained += engine.idle();

    assert_eq!(drained, THREADS * PORTS_PER_THREAD);
    let directory = engine.server_directory();
    assert_eq!(directory.ports().len(), THREADS * PORTS_PER_THREAD);
    assert_eq!(directory.groups().len(), THREADS);
    // ids follow replay order, so each thread's ports come back in submission order
    for t in 0..THREADS {
        let ids: Vec<PortId> = (0..PORTS_PER_THREAD)
            .map(|p| directory.find_port(&format!("client-{}:out_{}", t, p)).port)
            .collect();
        assert!(ids.iter().all(|id| id.is_valid()));
        assert!(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "client-{} ports replayed out of order",
            t
        );
    }
}

#[test]
fn test_short_lived_clients_are_skipped() {
    let engine = rack_engine();
    let server = engine.notifications();

    server.client_registered("blip");
    server.port_registered("out", "blip:out", PortFlags::AUDIO);
    server.port_registered("in", "system:in", PortFlags::AUDIO | PortFlags::IS_INPUT);
    server.ports_connected("blip:out", "system:in");
    server.port_unregistered("blip:out");
    server.client_unregistered("blip");

    assert_eq!(engine.idle(), 6);
    let directory = engine.server_directory();
    assert!(directory.find_group_id("blip").is_none());
    assert!(!directory.find_port("blip:out").is_valid());
    assert!(directory.find_port("system:in").is_valid());
    assert!(directory.connections().is_empty());
}

#[test]
fn test_server_connections_and_renames() {
    let engine = rack_engine();
    let server = engine.notifications();

    server.port_registered("capture_1", "system:capture_1", PortFlags::AUDIO);
    server.port_registered("in", "fx:in", PortFlags::AUDIO | PortFlags::IS_INPUT);
    server.ports_connected("system:capture_1", "fx:in");
    engine.idle();
    assert_eq!(engine.server_directory().connections().len(), 1);

    server.port_renamed("fx:in", "fx:input", "input");
    server.ports_disconnected("system:capture_1", "fx:input");
    engine.idle();

    let directory = engine.server_directory();
    assert!(directory.find_port("fx:input").is_valid());
    assert!(!directory.find_port("fx:in").is_valid());
    assert!(directory.connections().is_empty());
}

#[test]
fn test_sink_sees_replayed_events() {
    let (sink, receiver) = ChannelSink::new();
    let engine = HostEngine::builder()
        .notification_sink(Arc::new(sink))
        .build()
        .unwrap();
    // graph setup announces the server groups and the rack
    let _setup: Vec<_> = receiver.try_iter().collect();

    let server = engine.notifications();
    server.client_registered("system");
    server.client_position_changed("system", 1, 2, 3, 4);
    assert!(receiver.try_iter().next().is_none());

    engine.idle();
    let events: Vec<_> = receiver.try_iter().collect();
    assert!(matches!(
        events.as_slice(),
        [
            PatchbayNotification::ClientAdded { name, .. },
            PatchbayNotification::ClientPositionChanged { x1: 1, y2: 4, .. },
        ] if name == "system"
    ));
    assert_eq!(engine.patchbay_positions().len(), 1);
}

#[test]
fn test_idle_without_events() {
    let engine = patchbay_engine(2, 2, 0);
    assert_eq!(engine.idle(), 0);
    assert!(engine.server_directory().groups().is_empty());
}
