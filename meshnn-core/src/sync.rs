//! Synchronization primitive re-exports.
//!
//! Production code always uses `parking_lot` (uncontended-fast, no lock
//! poisoning to route around in every call site). The `loom` feature flag
//! exists only to let `tests/region_lock_loom.rs` model-check a reference
//! implementation of the [`crate::region_lock::RegionLocker`] protocol under
//! loom's exhaustive interleaving search; loom requires every primitive in
//! the interleaving to be loom-aware, which `parking_lot`/`dashmap` are not,
//! so that test rebuilds the bitmap-acquire/validate/release sequence with
//! loom's own `Mutex`/`Condvar` rather than sharing this module's types.
//!
//! Nothing in `meshnn-core`'s public API is gated on `loom`; it only affects
//! what `cfg(loom)` test code compiles against.

#[cfg(not(loom))]
pub use parking_lot::{Condvar, Mutex, RwLock};

#[cfg(loom)]
pub use loom::sync::{Condvar, Mutex, RwLock};

#[cfg(not(loom))]
pub use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
#[cfg(loom)]
pub use loom::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
