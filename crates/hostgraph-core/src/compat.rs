//! Common sync and collection re-exports shared by the workspace crates.

pub use parking_lot::{Mutex, MutexGuard, RwLock};

pub use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering},
    Arc, Weak,
};
