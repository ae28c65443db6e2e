//! Integer syscall surface.
//!
//! User processes see plain integers: create calls return a handle or an
//! `INVALID_*` sentinel, every other call returns [`SYNC_SUCCESS`] or
//! [`SYNC_FAIL`]. Only a [`FatalError`] escapes as an `Err`; the kernel is
//! expected to halt on it.

use crate::error::{FatalError, SyncError};
use crate::process::ProcessOps;
use crate::synch::Synch;

/// Returned by wait/signal/acquire/release calls that succeed.
pub const SYNC_SUCCESS: i32 = 1;
/// Returned by wait/signal/acquire/release calls that fail.
pub const SYNC_FAIL: i32 = -1;
/// Returned by a failed semaphore create.
pub const INVALID_SEM: i32 = -1;
/// Returned by a failed lock create.
pub const INVALID_LOCK: i32 = -1;
/// Returned by a failed condition create.
pub const INVALID_COND: i32 = -1;

// ── Semaphores (0x80–0x87) ───────────────────────────────────────────

/// Create a semaphore. Argument: initial count.
pub const SYS_SEM_CREATE: usize = 0x80;
/// Wait on a semaphore. Argument: handle.
pub const SYS_SEM_WAIT: usize = 0x81;
/// Signal a semaphore. Argument: handle.
pub const SYS_SEM_SIGNAL: usize = 0x82;

// ── Locks (0x88–0x8F) ────────────────────────────────────────────────

/// Create a lock. No argument.
pub const SYS_LOCK_CREATE: usize = 0x88;
/// Acquire a lock. Argument: handle.
pub const SYS_LOCK_ACQUIRE: usize = 0x89;
/// Release a lock. Argument: handle.
pub const SYS_LOCK_RELEASE: usize = 0x8A;

// ── Condition variables (0x90–0x97) ──────────────────────────────────

/// Create a condition variable. Argument: lock handle.
pub const SYS_COND_CREATE: usize = 0x90;
/// Wait on a condition variable. Argument: handle.
pub const SYS_COND_WAIT: usize = 0x91;
/// Signal a condition variable. Argument: handle.
pub const SYS_COND_SIGNAL: usize = 0x92;

fn status(result: Result<(), SyncError>) -> Result<i32, FatalError> {
    match result {
        Ok(()) => Ok(SYNC_SUCCESS),
        Err(SyncError::Fatal(err)) => Err(err),
        Err(_) => Ok(SYNC_FAIL),
    }
}

fn handle(result: Result<i32, SyncError>, invalid: i32) -> Result<i32, FatalError> {
    match result {
        Ok(raw) => Ok(raw),
        Err(SyncError::Fatal(err)) => Err(err),
        Err(_) => Ok(invalid),
    }
}

/// Creates a semaphore, returning its handle or [`INVALID_SEM`].
///
/// # Errors
///
/// Never fails; the `Result` keeps every entry point uniform.
pub fn sem_create<P: ProcessOps>(synch: &Synch<P>, count: i32) -> Result<i32, FatalError> {
    handle(synch.sem_create(count).map(|id| id.as_raw()), INVALID_SEM)
}

/// Waits on a semaphore.
///
/// # Errors
///
/// [`FatalError`] if the kernel must halt.
pub fn sem_wait<P: ProcessOps>(synch: &Synch<P>, sem: i32) -> Result<i32, FatalError> {
    status(synch.sem_handle_wait(sem))
}

/// Signals a semaphore.
///
/// # Errors
///
/// Never fails; the `Result` keeps every entry point uniform.
pub fn sem_signal<P: ProcessOps>(synch: &Synch<P>, sem: i32) -> Result<i32, FatalError> {
    status(synch.sem_handle_signal(sem))
}

/// Creates a lock, returning its handle or [`INVALID_LOCK`].
///
/// # Errors
///
/// Never fails; the `Result` keeps every entry point uniform.
pub fn lock_create<P: ProcessOps>(synch: &Synch<P>) -> Result<i32, FatalError> {
    handle(synch.lock_create().map(|id| id.as_raw()), INVALID_LOCK)
}

/// Acquires a lock.
///
/// # Errors
///
/// [`FatalError`] if the kernel must halt.
pub fn lock_acquire<P: ProcessOps>(synch: &Synch<P>, lock: i32) -> Result<i32, FatalError> {
    status(synch.lock_handle_acquire(lock))
}

/// Releases a lock.
///
/// # Errors
///
/// Never fails; the `Result` keeps every entry point uniform.
pub fn lock_release<P: ProcessOps>(synch: &Synch<P>, lock: i32) -> Result<i32, FatalError> {
    status(synch.lock_handle_release(lock))
}

/// Creates a condition variable on `lock`, returning its handle or
/// [`INVALID_COND`].
///
/// # Errors
///
/// Never fails; the `Result` keeps every entry point uniform.
pub fn cond_create<P: ProcessOps>(synch: &Synch<P>, lock: i32) -> Result<i32, FatalError> {
    handle(synch.cond_handle_create(lock).map(|id| id.as_raw()), INVALID_COND)
}

/// Waits on a condition variable.
///
/// # Errors
///
/// [`FatalError`] if the kernel must halt.
pub fn cond_wait<P: ProcessOps>(synch: &Synch<P>, cond: i32) -> Result<i32, FatalError> {
    status(synch.cond_handle_wait(cond))
}

/// Signals a condition variable.
///
/// # Errors
///
/// [`FatalError`] if the kernel must halt.
pub fn cond_signal<P: ProcessOps>(synch: &Synch<P>, cond: i32) -> Result<i32, FatalError> {
    status(synch.cond_handle_signal(cond))
}

/// Routes a syscall to the matching operation.
///
/// `arg` is the raw argument register, read as a signed value by the calls
/// that take one. For those, an argument that does not fit an `i32` returns
/// [`SYNC_FAIL`]; [`SYS_LOCK_CREATE`] ignores the register. Unknown syscall
/// numbers return [`SYNC_FAIL`].
///
/// # Errors
///
/// [`FatalError`] if the kernel must halt.
#[allow(clippy::cast_possible_wrap)]
pub fn dispatch<P: ProcessOps>(
    synch: &Synch<P>,
    nr: usize,
    arg: usize,
) -> Result<isize, FatalError> {
    let op: fn(&Synch<P>, i32) -> Result<i32, FatalError> = match nr {
        SYS_LOCK_CREATE => return Ok(lock_create(synch)? as isize),
        SYS_SEM_CREATE => sem_create,
        SYS_SEM_WAIT => sem_wait,
        SYS_SEM_SIGNAL => sem_signal,
        SYS_LOCK_ACQUIRE => lock_acquire,
        SYS_LOCK_RELEASE => lock_release,
        SYS_COND_CREATE => cond_create,
        SYS_COND_WAIT => cond_wait,
        SYS_COND_SIGNAL => cond_signal,
        _ => {
            kwarn!("synch: unknown syscall {:#x}", nr);
            return Ok(SYNC_FAIL as isize);
        }
    };
    let Ok(arg) = i32::try_from(arg as isize) else {
        kdebug!("synch: syscall {:#x} argument {:#x} out of range", nr, arg);
        return Ok(SYNC_FAIL as isize);
    };
    Ok(op(synch, arg)? as isize)
}
