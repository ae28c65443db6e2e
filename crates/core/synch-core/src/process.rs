//! The boundary to the kernel's process layer.

use crate::id::Pid;

/// Scheduler operations the synchronization primitives depend on.
///
/// The primitives call these with interrupts masked and the pool tables
/// unlocked. An implementation must therefore tolerate the following order
/// on one CPU (or between two host threads):
///
/// 1. process A decides to block and enqueues itself,
/// 2. process B dequeues A and calls [`wakeup`](ProcessOps::wakeup),
/// 3. A calls [`sleep`](ProcessOps::sleep).
///
/// The wakeup in step 2 must not be lost: `sleep` returns at once when a
/// wakeup is already pending for the caller.
pub trait ProcessOps: Sync {
    /// Returns the identifier of the running process.
    fn current_pid(&self) -> Pid;

    /// Blocks the running process until some other process wakes it.
    fn sleep(&self);

    /// Makes `pid` runnable again.
    fn wakeup(&self, pid: Pid);
}
