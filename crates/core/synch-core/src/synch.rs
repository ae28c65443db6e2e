//! The synchronization tables and their entry points.
//!
//! [`Synch`] owns all three pools behind a single [`IrqLock`]. Every
//! operation takes that lock for its whole critical section; an operation
//! that blocks releases it around the call to [`ProcessOps::sleep`] and
//! finishes its critical section after it is woken.
//!
//! Each engine offers two forms of every operation:
//!
//! - the reference form takes a typed handle ([`SemId`], [`LockId`],
//!   [`CondId`]) and cannot fail on validation, because a typed handle is
//!   only ever produced by a create call or by validation. Used on a
//!   `Synch` other than the one that issued it, a handle whose slot is free
//!   there panics;
//! - the handle form takes the raw `i32` a user process passed in, checks it
//!   against the pool and then runs the reference form.
//!
//! The operations themselves live next to their entity types in the
//! `semaphore`, `lock` and `cond` modules.

use crate::config::{MAX_CONDS, MAX_LOCKS, MAX_SEMS};
use crate::cond::Cond;
use crate::error::SyncError;
use crate::id::{CondId, LockId, SemId};
use crate::irq::{IrqLock, IrqLockGuard};
use crate::lock::Lock;
use crate::pool::HandlePool;
use crate::process::ProcessOps;
use crate::semaphore::Semaphore;

/// All three pools. Guarded as one unit.
pub(crate) struct Tables {
    pub(crate) sems: HandlePool<Semaphore, MAX_SEMS>,
    pub(crate) locks: HandlePool<Lock, MAX_LOCKS>,
    pub(crate) conds: HandlePool<Cond, MAX_CONDS>,
}

/// Slot usage per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    /// Allocated semaphores.
    pub sems: usize,
    /// Allocated locks.
    pub locks: usize,
    /// Allocated condition variables.
    pub conds: usize,
}

/// Semaphores, locks and condition variables for one kernel.
///
/// `P` is the kernel's process layer. A kernel typically keeps one `Synch`
/// in a `static`:
///
/// ```ignore
/// static SYNCH: Synch<Scheduler> = Synch::new(Scheduler);
/// ```
pub struct Synch<P> {
    procs: P,
    tables: IrqLock<Tables>,
}

impl<P> Synch<P> {
    /// Creates the tables with every slot free.
    pub const fn new(procs: P) -> Self {
        Self {
            procs,
            tables: IrqLock::new(Tables {
                sems: HandlePool::new(),
                locks: HandlePool::new(),
                conds: HandlePool::new(),
            }),
        }
    }

    /// Returns the process layer.
    pub fn processes(&self) -> &P {
        &self.procs
    }

    /// Enters the critical section.
    pub(crate) fn tables(&self) -> IrqLockGuard<'_, Tables> {
        self.tables.lock()
    }

    /// Returns how many slots of each pool are allocated.
    pub fn usage(&self) -> PoolUsage {
        let tables = self.tables();
        PoolUsage {
            sems: tables.sems.in_use(),
            locks: tables.locks.in_use(),
            conds: tables.conds.in_use(),
        }
    }

    /// Checks a raw semaphore handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] if `raw` is negative, out of range or
    /// names a free slot.
    pub fn sem_validate(&self, raw: i32) -> Result<SemId, SyncError> {
        let index = self.tables().sems.validate(raw);
        index.map(SemId::new).ok_or_else(|| {
            kdebug!("synch: invalid semaphore handle {}", raw);
            SyncError::InvalidHandle
        })
    }

    /// Checks a raw lock handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] if `raw` is negative, out of range or
    /// names a free slot.
    pub fn lock_validate(&self, raw: i32) -> Result<LockId, SyncError> {
        let index = self.tables().locks.validate(raw);
        index.map(LockId::new).ok_or_else(|| {
            kdebug!("synch: invalid lock handle {}", raw);
            SyncError::InvalidHandle
        })
    }

    /// Checks a raw condition variable handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] if `raw` is negative, out of range or
    /// names a free slot.
    pub fn cond_validate(&self, raw: i32) -> Result<CondId, SyncError> {
        let index = self.tables().conds.validate(raw);
        index.map(CondId::new).ok_or_else(|| {
            kdebug!("synch: invalid condition handle {}", raw);
            SyncError::InvalidHandle
        })
    }
}

impl<P: ProcessOps> Synch<P> {
    /// Sleeps the current process with the tables unlocked and interrupts
    /// still masked. Returns with the tables locked again.
    pub(crate) fn block(&self, tables: &mut IrqLockGuard<'_, Tables>) {
        tables.unlocked(|| self.procs.sleep());
    }
}

#[cfg(all(test, feature = "std", not(shuttle)))]
mod tests {
    use super::*;
    use crate::host::HostProcesses;

    #[test]
    fn starts_empty() {
        let synch = Synch::new(HostProcesses::new());
        assert_eq!(
            synch.usage(),
            PoolUsage {
                sems: 0,
                locks: 0,
                conds: 0,
            }
        );
    }

    #[test]
    fn usage_counts_each_pool() {
        let synch = Synch::new(HostProcesses::new());
        synch.sem_create(0).unwrap();
        synch.sem_create(1).unwrap();
        let lock = synch.lock_create().unwrap();
        synch.cond_create(lock).unwrap();
        assert_eq!(
            synch.usage(),
            PoolUsage {
                sems: 2,
                locks: 1,
                conds: 1,
            }
        );
    }

    #[test]
    fn validation_rejects_out_of_range_and_free() {
        let synch = Synch::new(HostProcesses::new());
        let sem = synch.sem_create(3).unwrap();
        assert_eq!(synch.sem_validate(sem.as_raw()), Ok(sem));
        for raw in [-1, i32::MIN, sem.as_raw() + 1, MAX_SEMS as i32, i32::MAX] {
            assert_eq!(synch.sem_validate(raw), Err(SyncError::InvalidHandle));
        }
        assert_eq!(synch.lock_validate(0), Err(SyncError::InvalidHandle));
        assert_eq!(synch.cond_validate(0), Err(SyncError::InvalidHandle));
        assert_eq!(synch.sem_count(sem), 3);
    }

    #[test]
    #[should_panic(expected = "is free")]
    fn handle_from_another_instance_panics_on_a_free_slot() {
        let issuer = Synch::new(HostProcesses::new());
        let other = Synch::new(HostProcesses::new());
        let sem = issuer.sem_create(1).unwrap();
        other.sem_signal(sem);
    }

    // A process layer with one process that never blocks.
    struct Solo;

    impl ProcessOps for Solo {
        fn current_pid(&self) -> crate::id::Pid {
            crate::id::Pid::new(1)
        }

        fn sleep(&self) {
            panic!("the only process cannot block");
        }

        fn wakeup(&self, pid: crate::id::Pid) {
            panic!("no process {pid} to wake");
        }
    }

    #[test]
    fn usable_from_a_static() {
        static SYNCH: Synch<Solo> = Synch::new(Solo);
        let lock = SYNCH.lock_create().unwrap();
        assert_eq!(SYNCH.lock_validate(lock.as_raw()), Ok(lock));
        SYNCH.lock_acquire(lock).unwrap();
        SYNCH.lock_acquire(lock).unwrap();
        SYNCH.lock_release(lock).unwrap();
        assert_eq!(SYNCH.lock_owner(lock), None);
    }
}
