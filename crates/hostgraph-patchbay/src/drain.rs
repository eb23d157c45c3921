//! Postponed server notifications.
//!
//! Server callback threads must not touch the [`TopologyDirectory`]. They
//! [`postpone`](NotificationDrain::postpone) a small owned event instead, and
//! the control thread replays the batch with
//! [`drain`](NotificationDrain::drain).
//!
//! A drain swaps the pending list for an empty one under the lock, so events
//! postponed while a batch is replayed land in the next batch. Drains are
//! serialized, which keeps FIFO order across batches.

use crate::directory::{PortFlags, TopologyDirectory};
use hostgraph_core::compat::Mutex;
use smallvec::SmallVec;

/// A topology change reported by the audio server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostponedEvent {
    ClientRegistered {
        name: String,
    },
    ClientUnregistered {
        name: String,
    },
    ClientPositionChanged {
        name: String,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    },
    PortRegistered {
        short_name: String,
        full_name: String,
        flags: PortFlags,
    },
    PortUnregistered {
        full_name: String,
    },
    PortConnected {
        port_a: String,
        port_b: String,
    },
    PortDisconnected {
        port_a: String,
        port_b: String,
    },
    PortRenamed {
        old_full_name: String,
        new_full_name: String,
        new_short_name: String,
    },
}

/// Client name of a full port name: everything before `":" + short_name`,
/// or before the first `:` when the short name does not match.
fn client_of<'a>(full_name: &'a str, short_name: &str) -> Option<&'a str> {
    if let Some(client) = full_name
        .strip_suffix(short_name)
        .and_then(|rest| rest.strip_suffix(':'))
    {
        return Some(client);
    }
    full_name.split_once(':').map(|(client, _)| client)
}

/// Names whose last event in a batch removes them.
#[derive(Default)]
struct IgnoreList<'a> {
    names: SmallVec<[&'a str; 8]>,
}

impl<'a> IgnoreList<'a> {
    fn add(&mut self, name: &'a str) {
        if !self.contains(name) {
            self.names.push(name);
        }
    }

    fn remove(&mut self, name: &str) {
        self.names.retain(|n| *n != name);
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }
}

/// Mutex-protected queue of [`PostponedEvent`]s.
#[derive(Debug, Default)]
pub struct NotificationDrain {
    pending: Mutex<Vec<PostponedEvent>>,
    /// Emptied batch kept for reuse by the next drain.
    spare: Mutex<Vec<PostponedEvent>>,
    draining: Mutex<()>,
}

impl NotificationDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one event. Callable from any thread; only takes the queue lock.
    pub fn postpone(&self, event: PostponedEvent) {
        self.pending.lock().push(event);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Hand the current batch, in FIFO order, to `handler`.
    pub fn drain_with(&self, mut handler: impl FnMut(&PostponedEvent)) -> usize {
        let _draining = self.draining.lock();
        let batch = self.take_batch();
        for event in &batch {
            handler(event);
        }
        self.recycle(batch)
    }

    /// Replay the current batch against `directory`.
    ///
    /// Registrations and connections whose client or port is unregistered
    /// later in the same batch are skipped. Returns the batch size.
    pub fn drain(&self, directory: &TopologyDirectory) -> usize {
        let _draining = self.draining.lock();
        let batch = self.take_batch();
        if batch.is_empty() {
            return self.recycle(batch);
        }

        {
            let mut clients = IgnoreList::default();
            let mut ports = IgnoreList::default();
            for event in &batch {
                match event {
                    PostponedEvent::ClientRegistered { name } => clients.remove(name),
                    PostponedEvent::ClientUnregistered { name } => clients.add(name),
                    PostponedEvent::PortRegistered { full_name, .. } => ports.remove(full_name),
                    PostponedEvent::PortUnregistered { full_name } => ports.add(full_name),
                    _ => {}
                }
            }

            for event in &batch {
                replay(directory, event, &clients, &ports);
            }
        }
        tracing::debug!("Drained {} postponed server events", batch.len());
        self.recycle(batch)
    }

    fn take_batch(&self) -> Vec<PostponedEvent> {
        let mut batch = core::mem::take(&mut *self.spare.lock());
        core::mem::swap(&mut *self.pending.lock(), &mut batch);
        batch
    }

    fn recycle(&self, mut batch: Vec<PostponedEvent>) -> usize {
        let count = batch.len();
        batch.clear();
        *self.spare.lock() = batch;
        count
    }
}

fn replay(directory: &TopologyDirectory, event: &PostponedEvent, clients: &IgnoreList<'_>, ports: &IgnoreList<'_>) {
    match event {
        PostponedEvent::ClientRegistered { name } => {
            if !clients.contains(name) {
                directory.add_group(name);
            }
        }
        PostponedEvent::ClientUnregistered { name } => {
            // clients may have registered without ports
            if let Some(group) = directory.find_group_id(name) {
                directory.remove_group(group);
            }
        }
        PostponedEvent::ClientPositionChanged {
            name,
            x1,
            y1,
            x2,
            y2,
        } => {
            if clients.contains(name) {
                return;
            }
            if let Some(group) = directory.find_group_id(name) {
                directory.set_position(group, *x1, *y1, *x2, *y2);
            }
        }
        PostponedEvent::PortRegistered {
            short_name,
            full_name,
            flags,
        } => {
            if ports.contains(full_name) {
                return;
            }
            let Some(client) = client_of(full_name, short_name) else {
                tracing::warn!("Port '{}' has no client prefix", full_name);
                return;
            };
            let group = match directory.find_group_id(client) {
                Some(group) => group,
                None => directory.add_group(client),
            };
            directory.add_port(group, short_name, full_name, *flags);
        }
        PostponedEvent::PortUnregistered { full_name } => {
            directory.remove_port_by_name(full_name);
        }
        PostponedEvent::PortConnected { port_a, port_b } => {
            if ports.contains(port_a) || ports.contains(port_b) {
                return;
            }
            let (a, b) = (directory.find_port(port_a), directory.find_port(port_b));
            if a.is_valid() && b.is_valid() {
                directory.add_connection(a.group, a.port, b.group, b.port);
            }
        }
        PostponedEvent::PortDisconnected { port_a, port_b } => {
            let (a, b) = (directory.find_port(port_a), directory.find_port(port_b));
            if !a.is_valid() || !b.is_valid() {
                return;
            }
            if let Some(id) = directory.find_connection(a.group, a.port, b.group, b.port) {
                directory.remove_connection(id);
            }
        }
        PostponedEvent::PortRenamed {
            old_full_name,
            new_full_name,
            new_short_name,
        } => {
            let entry = directory.find_port(old_full_name);
            if entry.is_valid() {
                directory.rename_port(entry.port, new_short_name, new_full_name);
            }
        }
    }
}
