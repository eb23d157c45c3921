//! Reference-counted process-wide state.
//!
//! Plugin-format hosts keep tables shared by every instance (feature/URI maps,
//! instance counters). [`SharedResource`] creates such state on the first
//! [`acquire`](SharedResource::acquire) and tears it down when the last
//! [`SharedLease`] is dropped.

use crate::compat::{Arc, Mutex};
use std::ops::Deref;
use std::sync::OnceLock;

struct State<T> {
    value: Option<Arc<T>>,
    leases: usize,
    /// Bumped by `reset`; leases from an older epoch no longer count.
    epoch: u64,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    init: Box<dyn Fn() -> T + Send + Sync>,
}

/// Lazily created, lease-counted shared value.
pub struct SharedResource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedResource<T> {
    pub fn new(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    value: None,
                    leases: 0,
                    epoch: 0,
                }),
                init: Box::new(init),
            }),
        }
    }

    /// Take a lease, creating the value if no lease is live.
    pub fn acquire(&self) -> SharedLease<T> {
        let mut state = self.inner.state.lock();
        let value = match &state.value {
            Some(value) => Arc::clone(value),
            None => {
                let value = Arc::new((self.inner.init)());
                state.value = Some(Arc::clone(&value));
                tracing::debug!("Shared resource initialized");
                value
            }
        };
        state.leases += 1;
        SharedLease {
            inner: Arc::clone(&self.inner),
            value,
            epoch: state.epoch,
        }
    }

    /// Number of live leases.
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().leases
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    /// Drop the value and forget all outstanding leases.
    ///
    /// Leases taken before the reset keep their value alive but are no longer
    /// counted.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.value = None;
        state.leases = 0;
        state.epoch += 1;
    }
}

/// A counted handle to the shared value. Dropping the last one tears it down.
pub struct SharedLease<T> {
    inner: Arc<Inner<T>>,
    value: Arc<T>,
    epoch: u64,
}

impl<T> Deref for SharedLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for SharedLease<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if state.epoch != self.epoch {
            return;
        }
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 {
            state.value = None;
            tracing::debug!("Shared resource released");
        }
    }
}

impl<T> core::fmt::Debug for SharedLease<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedLease").field("epoch", &self.epoch).finish()
    }
}

/// URI to integer map shared by all plugin instances. Id 0 is never handed out.
#[derive(Debug, Default)]
pub struct FeatureTable {
    uris: Mutex<Vec<String>>,
}

impl FeatureTable {
    pub fn map(&self, uri: &str) -> u32 {
        let mut uris = self.uris.lock();
        if let Some(pos) = uris.iter().position(|u| u == uri) {
            return pos as u32 + 1;
        }
        uris.push(uri.to_owned());
        uris.len() as u32
    }

    pub fn unmap(&self, id: u32) -> Option<String> {
        let index = id.checked_sub(1)?;
        self.uris.lock().get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.uris.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared by every hosted plugin in the process.
#[derive(Debug, Default)]
pub struct HostGlobals {
    pub features: FeatureTable,
}

/// The process-wide [`HostGlobals`]; each live plugin slot holds one lease.
pub fn host_globals() -> &'static SharedResource<HostGlobals> {
    static GLOBALS: OnceLock<SharedResource<HostGlobals>> = OnceLock::new();
    GLOBALS.get_or_init(|| SharedResource::new(HostGlobals::default))
}

/// Number of plugin instances alive in the process.
pub fn live_plugin_count() -> usize {
    host_globals().live_count()
}
