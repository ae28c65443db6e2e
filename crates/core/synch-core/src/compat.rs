//! Shuttle compatibility shim.
//!
//! When compiled with `cfg(shuttle)`, re-exports shuttle's threading
//! primitives so the host process table and the per-thread interrupt mask
//! run under shuttle's randomized scheduler. Otherwise, re-exports `std`
//! (or nothing, for kernel builds).

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, feature = "std"))]
pub(crate) use shuttle::sync::{Condvar, Mutex};
#[cfg(all(shuttle, feature = "std"))]
pub(crate) use shuttle::thread;
#[cfg(all(shuttle, feature = "std"))]
pub(crate) use shuttle::thread_local;

/// Backoff inside a spin loop. Under shuttle this is a scheduling point, so
/// the holder gets to run.
#[cfg(shuttle)]
#[inline]
pub(crate) fn spin_hint() {
    shuttle::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(all(not(shuttle), feature = "std"))]
pub(crate) use std::sync::{Condvar, Mutex};
#[cfg(all(not(shuttle), feature = "std"))]
pub(crate) use std::thread;
#[cfg(all(not(shuttle), feature = "std"))]
pub(crate) use std::thread_local;

#[cfg(not(shuttle))]
#[inline]
pub(crate) fn spin_hint() {
    core::hint::spin_loop();
}
