//! Pausing the audio thread around structural changes.
//!
//! The audio thread [`enter`](Runner::enter)s the runner at the start of every
//! block. A [`ScopedRunnerStopper`] raises a stop request and waits, bounded,
//! until no block is in flight; while it lives every block is skipped.
//!
//! ```text
//! audio:   running = true  -> stop requested?  -> yes: running = false, skip
//! control: requests += 1   -> running?         -> wait (bounded) / proceed
//! ```
//!
//! Both sides publish before they read, so at least one of them sees the
//! other.

use crate::error::{Error, Result};
use crossbeam::utils::Backoff;
use hostgraph_core::compat::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run/stop handshake shared by the audio thread and the control thread.
#[derive(Debug, Default)]
pub struct Runner {
    stop_requests: AtomicUsize,
    running: AtomicBool,
    parked_blocks: AtomicU64,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a block. `None` while a stopper is alive.
    #[inline]
    pub fn enter(&self) -> Option<RunGuard<'_>> {
        self.running.store(true, Ordering::SeqCst);
        if self.stop_requests.load(Ordering::SeqCst) > 0 {
            self.running.store(false, Ordering::SeqCst);
            self.parked_blocks.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(RunGuard { runner: self })
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_requests.load(Ordering::SeqCst) > 0
    }

    /// Blocks skipped because a stopper was alive.
    pub fn parked_blocks(&self) -> u64 {
        self.parked_blocks.load(Ordering::Relaxed)
    }
}

/// A block in flight. Dropping it ends the block.
#[derive(Debug)]
pub struct RunGuard<'a> {
    runner: &'a Runner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runner.running.store(false, Ordering::SeqCst);
    }
}

/// Keeps the audio thread out of the graph while alive.
///
/// Stoppers nest; the runner resumes when the last one drops.
#[derive(Debug)]
pub struct ScopedRunnerStopper<'a> {
    runner: &'a Runner,
}

impl<'a> ScopedRunnerStopper<'a> {
    /// Request a stop and wait up to `timeout` for the current block to end.
    ///
    /// On timeout the request is withdrawn and nothing may be mutated.
    pub fn new(runner: &'a Runner, timeout: Duration) -> Result<Self> {
        runner.stop_requests.fetch_add(1, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();
        while runner.running.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                runner.stop_requests.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("Audio thread did not stop within {:?}", timeout);
                return Err(Error::RunnerTimeout(timeout));
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_micros(50));
            } else {
                backoff.snooze();
            }
        }

        Ok(Self { runner })
    }
}

impl Drop for ScopedRunnerStopper<'_> {
    fn drop(&mut self) {
        self.runner.stop_requests.fetch_sub(1, Ordering::SeqCst);
    }
}
