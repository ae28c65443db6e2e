//! Condition variables bound to a lock.
//!
//! The protocol hands the lock along with the wake-up rather than making the
//! woken process compete for it:
//!
//! - **wait** requires the caller to own the lock. It queues the caller,
//!   passes the lock on to the lock's next waiter (or frees it) and sleeps.
//!   On resume it takes the lock by setting the owner directly, then wakes
//!   the next process queued on the condition, if any.
//! - **signal** also requires the caller to own the lock. With nobody
//!   waiting it does nothing. Otherwise it wakes the oldest waiter, queues
//!   itself on the condition and sleeps until a later signal or the chained
//!   wake in a resuming waiter releases it. It returns without the lock.
//!
//! Because every resuming waiter wakes the next one, a single signal
//! releases everybody queued on the condition at that moment, the signaller
//! included, and each of them in turn records itself as the lock owner.

use crate::error::{QueueKind, SyncError};
use crate::id::{CondId, LockId, Pid};
use crate::log::Trace;
use crate::pool::PoolEntry;
use crate::process::ProcessOps;
use crate::synch::{Synch, Tables};
use crate::waitqueue::WaitQueue;

/// A condition variable and the lock it was created for.
#[derive(Debug)]
pub(crate) struct Cond {
    lock: LockId,
    waiting: WaitQueue,
}

impl PoolEntry for Cond {
    // The lock field of a free slot is never read.
    const VACANT: Self = Self {
        lock: LockId::new(0),
        waiting: WaitQueue::new(),
    };
}

impl<P: ProcessOps> Synch<P> {
    /// Allocates a condition variable bound to `lock`.
    ///
    /// # Errors
    ///
    /// [`SyncError::LockHeld`] if `lock` currently has an owner, and
    /// [`SyncError::PoolExhausted`] if every condition slot is in use.
    pub fn cond_create(&self, lock: LockId) -> Result<CondId, SyncError> {
        let mut tables = self.tables();
        if let Some(owner) = tables.locks.get(lock.index()).owner() {
            kwarn!(
                "synch: cannot bind a condition to lock {} while pid {} holds it",
                lock,
                owner
            );
            return Err(SyncError::LockHeld);
        }
        let cond = Cond {
            lock,
            waiting: WaitQueue::new(),
        };
        let Some(index) = tables.conds.allocate(cond) else {
            kwarn!("synch: no free condition slots");
            return Err(SyncError::PoolExhausted);
        };
        ktrace!(Trace::COND, "cond {}: created on lock {}", index, lock);
        Ok(CondId::new(index))
    }

    /// Waits on the condition.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotOwner`] without blocking if the caller does not own
    /// the condition's lock; [`SyncError::Fatal`] if the wait queue
    /// overflows.
    pub fn cond_wait(&self, cond: CondId) -> Result<(), SyncError> {
        let pid = self.processes().current_pid();
        let mut tables = self.tables();
        let index = cond.index();

        let Tables { locks, conds, .. } = &mut *tables;
        let entry = conds.get_mut(index);
        let lock_id = entry.lock;
        let lock = locks.get_mut(lock_id.index());
        if !lock.is_owned_by(pid) {
            kwarn!(
                "synch: cond {}: wait by pid {} without lock {} (owner {:?})",
                index,
                pid,
                lock_id,
                lock.owner()
            );
            return Err(SyncError::NotOwner);
        }
        entry.waiting.enqueue(pid, QueueKind::Condition, index)?;
        let next = lock.hand_off(self.processes());
        ktrace!(
            Trace::COND,
            "cond {}: pid {} waits, lock {} passed to {:?}",
            index,
            pid,
            lock_id,
            next
        );

        self.block(&mut tables);

        let Tables { locks, conds, .. } = &mut *tables;
        let entry = conds.get_mut(index);
        locks.get_mut(lock_id.index()).claim(pid);
        let chained = entry.waiting.pop_front();
        ktrace!(
            Trace::COND,
            "cond {}: pid {} resumed owning lock {}, chaining to {:?}",
            index,
            pid,
            lock_id,
            chained
        );
        if let Some(next) = chained {
            self.processes().wakeup(next);
        }
        Ok(())
    }

    /// Signals the condition.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotOwner`] if the caller does not own the condition's
    /// lock, with nothing changed; [`SyncError::Fatal`] if the wait queue
    /// overflows.
    pub fn cond_signal(&self, cond: CondId) -> Result<(), SyncError> {
        let pid = self.processes().current_pid();
        let mut tables = self.tables();
        let index = cond.index();

        let Tables { locks, conds, .. } = &mut *tables;
        let entry = conds.get_mut(index);
        let lock = locks.get(entry.lock.index());
        if !lock.is_owned_by(pid) {
            kwarn!(
                "synch: cond {}: signal by pid {} without lock {} (owner {:?})",
                index,
                pid,
                entry.lock,
                lock.owner()
            );
            return Err(SyncError::NotOwner);
        }
        let Some(waiter) = entry.waiting.pop_front() else {
            ktrace!(Trace::COND, "cond {}: signal with no waiters", index);
            return Ok(());
        };
        self.processes().wakeup(waiter);
        entry.waiting.enqueue(pid, QueueKind::Condition, index)?;
        ktrace!(
            Trace::COND,
            "cond {}: pid {} woke pid {} and waits",
            index,
            pid,
            waiter
        );

        self.block(&mut tables);
        ktrace!(Trace::COND, "cond {}: signaller pid {} resumed", index, pid);
        Ok(())
    }

    /// [`cond_create`](Self::cond_create) on a raw lock handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] if `raw_lock` does not name an allocated
    /// lock, otherwise as [`cond_create`](Self::cond_create).
    pub fn cond_handle_create(&self, raw_lock: i32) -> Result<CondId, SyncError> {
        let lock = self.lock_validate(raw_lock)?;
        self.cond_create(lock)
    }

    /// [`cond_wait`](Self::cond_wait) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle, with no state
    /// changed, otherwise as [`cond_wait`](Self::cond_wait).
    pub fn cond_handle_wait(&self, raw: i32) -> Result<(), SyncError> {
        let cond = self.cond_validate(raw)?;
        self.cond_wait(cond)
    }

    /// [`cond_signal`](Self::cond_signal) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle, with no state
    /// changed, otherwise as [`cond_signal`](Self::cond_signal).
    pub fn cond_handle_signal(&self, raw: i32) -> Result<(), SyncError> {
        let cond = self.cond_validate(raw)?;
        self.cond_signal(cond)
    }

    /// The lock the condition was created for.
    pub fn cond_lock(&self, cond: CondId) -> LockId {
        self.tables().conds.get(cond.index()).lock
    }

    /// Number of processes queued on the condition, signallers included.
    pub fn cond_waiters(&self, cond: CondId) -> usize {
        self.tables().conds.get(cond.index()).waiting.len()
    }

    /// Returns `true` if `pid` is queued on the condition.
    pub fn cond_is_waiting(&self, cond: CondId, pid: Pid) -> bool {
        self.tables().conds.get(cond.index()).waiting.contains(pid)
    }
}
