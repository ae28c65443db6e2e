//! Interrupt masking and the interrupt-safe table lock.
//!
//! On a single CPU, masking interrupts is the whole of mutual exclusion:
//! nothing can preempt the running process until it re-enables them or
//! blocks. [`IrqLock`] pairs the mask with a spin flag so the same code is
//! also correct when host threads stand in for processes.
//!
//! With the `std` feature on a hosted target the "interrupt flag" is a
//! per-thread bit, which lets tests check that every operation restores
//! the state it found.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::compat;
use crate::log::Trace;

/// Interrupt state saved by [`disable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "dropping the saved state leaves interrupts masked"]
pub struct IrqState {
    flags: u64,
}

impl IrqState {
    /// Returns `true` if interrupts were enabled when the state was saved.
    pub fn were_enabled(self) -> bool {
        flags_enabled(self.flags)
    }
}

/// Masks interrupts, returning the previous state.
#[inline]
pub fn disable() -> IrqState {
    IrqState {
        flags: save_flags_and_cli(),
    }
}

/// Restores the state returned by a matching [`disable`].
#[inline]
pub fn restore(state: IrqState) {
    restore_flags(state.flags);
}

/// Returns `true` if interrupts are currently enabled.
#[inline]
pub fn enabled() -> bool {
    flags_enabled(read_flags())
}

/// A spin lock that masks interrupts while held.
pub struct IrqLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: the flag hands out exclusive access to `data` one guard at a time.
unsafe impl<T: Send> Send for IrqLock<T> {}
unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    /// Creates a new unlocked `IrqLock`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, masking interrupts first.
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let saved = disable();
        self.acquire();
        ktrace!(
            Trace::IRQ,
            "irq: masked (previously {})",
            if saved.were_enabled() { "on" } else { "off" }
        );
        IrqLockGuard {
            lock: self,
            saved,
            _not_send: PhantomData,
        }
    }

    fn acquire(&self) {
        // TTAS spin.
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                compat::spin_hint();
            }
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard that unlocks and restores the interrupt state on drop.
pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    saved: IrqState,
    // The saved state belongs to this CPU (or host thread).
    _not_send: PhantomData<*const ()>,
}

impl<T> IrqLockGuard<'_, T> {
    /// Runs `f` with the lock released and interrupts still masked, then
    /// reacquires the lock.
    ///
    /// This is how a process blocks from inside a critical section: the
    /// scheduler switches away with interrupts off, and whichever process
    /// runs next restores its own state. The saved state of this guard is
    /// only restored when the guard drops after the process resumes.
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        struct Relock<'a, T>(&'a IrqLock<T>);

        impl<T> Drop for Relock<'_, T> {
            fn drop(&mut self) {
                self.0.acquire();
            }
        }

        self.lock.release();
        let _relock = Relock(self.lock);
        f()
    }
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
        restore(self.saved);
    }
}

// ---------------------------------------------------------------------------
// x86_64: RFLAGS.IF
// ---------------------------------------------------------------------------

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
const IF: u64 = 1 << 9;

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[inline]
fn read_flags() -> u64 {
    let flags: u64;
    // SAFETY: Reading RFLAGS has no side effects.
    unsafe {
        core::arch::asm!("pushfq", "pop {}", out(reg) flags, options(nomem, preserves_flags));
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[inline]
fn save_flags_and_cli() -> u64 {
    let flags: u64;
    // SAFETY: Reading RFLAGS and disabling interrupts is safe in kernel mode.
    unsafe {
        core::arch::asm!(
            "pushfq",
            "pop {}",
            "cli",
            out(reg) flags,
            options(nomem),
        );
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[inline]
fn restore_flags(flags: u64) {
    if flags & IF != 0 {
        // SAFETY: Re-enabling interrupts is safe; we are restoring a previous state.
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
#[inline]
fn flags_enabled(flags: u64) -> bool {
    flags & IF != 0
}

// ---------------------------------------------------------------------------
// aarch64: DAIF.I
// ---------------------------------------------------------------------------

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
const DAIF_I: u64 = 1 << 7;

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
#[inline]
fn read_flags() -> u64 {
    let flags: u64;
    // SAFETY: Reading DAIF has no side effects.
    unsafe {
        core::arch::asm!("mrs {}, DAIF", out(reg) flags, options(nomem, nostack, preserves_flags));
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
#[inline]
fn save_flags_and_cli() -> u64 {
    let flags: u64;
    // SAFETY: Reading DAIF and masking interrupts is safe in kernel mode.
    unsafe {
        core::arch::asm!(
            "mrs {}, DAIF",
            "msr DAIFSet, #0xf",
            out(reg) flags,
            options(nomem),
        );
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
#[inline]
fn restore_flags(flags: u64) {
    // SAFETY: Restoring DAIF is safe; we are restoring a previous state.
    unsafe {
        core::arch::asm!(
            "msr DAIF, {}",
            in(reg) flags,
            options(nomem, nostack, preserves_flags),
        );
    }
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
#[inline]
fn flags_enabled(flags: u64) -> bool {
    flags & DAIF_I == 0
}

// ---------------------------------------------------------------------------
// Host with std: per-thread mask bit
// ---------------------------------------------------------------------------

#[cfg(all(not(target_os = "none"), feature = "std"))]
compat::thread_local! {
    static MASKED: core::cell::Cell<bool> = core::cell::Cell::new(false);
}

#[cfg(all(not(target_os = "none"), feature = "std"))]
#[inline]
fn read_flags() -> u64 {
    MASKED.with(|masked| u64::from(!masked.get()))
}

#[cfg(all(not(target_os = "none"), feature = "std"))]
#[inline]
fn save_flags_and_cli() -> u64 {
    MASKED.with(|masked| u64::from(!masked.replace(true)))
}

#[cfg(all(not(target_os = "none"), feature = "std"))]
#[inline]
fn restore_flags(flags: u64) {
    if flags != 0 {
        MASKED.with(|masked| masked.set(false));
    }
}

#[cfg(all(not(target_os = "none"), feature = "std"))]
#[inline]
fn flags_enabled(flags: u64) -> bool {
    flags != 0
}

// ---------------------------------------------------------------------------
// Anything else: no interrupts to mask
// ---------------------------------------------------------------------------

#[cfg(not(any(
    all(target_os = "none", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(not(target_os = "none"), feature = "std"),
)))]
mod fallback {
    #[inline]
    pub(super) fn read_flags() -> u64 {
        1
    }

    #[inline]
    pub(super) fn save_flags_and_cli() -> u64 {
        1
    }

    #[inline]
    pub(super) fn restore_flags(_flags: u64) {}

    #[inline]
    pub(super) fn flags_enabled(_flags: u64) -> bool {
        true
    }
}

#[cfg(not(any(
    all(target_os = "none", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(not(target_os = "none"), feature = "std"),
)))]
use fallback::{flags_enabled, read_flags, restore_flags, save_flags_and_cli};

#[cfg(all(test, feature = "std", not(shuttle)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn disable_and_restore_nest() {
        assert!(enabled());
        let outer = disable();
        assert!(!enabled());
        let inner = disable();
        assert!(!inner.were_enabled());
        restore(inner);
        assert!(!enabled());
        restore(outer);
        assert!(enabled());
    }

    #[test]
    fn guard_masks_while_held() {
        let lock = IrqLock::new(5u32);
        {
            let mut guard = lock.lock();
            assert!(!enabled());
            *guard += 1;
        }
        assert!(enabled());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn unlocked_releases_but_keeps_mask() {
        let lock = IrqLock::new(0u32);
        let mut guard = lock.lock();
        guard.unlocked(|| {
            assert!(!enabled());
            // Another guard can be taken while the first is parked.
            *lock.lock() += 1;
            assert!(!enabled());
        });
        assert_eq!(*guard, 1);
        drop(guard);
        assert!(enabled());
    }

    #[test]
    fn contended_counter() {
        let lock = Arc::new(IrqLock::new(0u64));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                    assert!(enabled());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }
}
