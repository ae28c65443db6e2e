//! Counting semaphores.
//!
//! `count` is "available minus waiting": a wait always decrements it, and a
//! negative count of `-n` means `n` processes are blocked. A signal
//! increments it and releases the oldest waiter if more processes are
//! queued than the count still owes.

use crate::error::{FatalError, QueueKind, SyncError};
use crate::id::SemId;
use crate::log::Trace;
use crate::pool::PoolEntry;
use crate::process::ProcessOps;
use crate::synch::Synch;
use crate::waitqueue::WaitQueue;

/// A counting semaphore with a FIFO queue of blocked processes.
#[derive(Debug)]
pub(crate) struct Semaphore {
    count: i32,
    waiting: WaitQueue,
}

impl Semaphore {
    fn new(count: i32) -> Self {
        Self {
            count,
            waiting: WaitQueue::new(),
        }
    }

    /// Returns `true` if a queued process is no longer covered by the
    /// count's deficit and may proceed.
    fn has_releasable_waiter(&self) -> bool {
        let deficit = usize::try_from(self.count.saturating_neg()).unwrap_or(0);
        self.waiting.len() > deficit
    }
}

impl PoolEntry for Semaphore {
    const VACANT: Self = Self {
        count: 0,
        waiting: WaitQueue::new(),
    };
}

impl<P: ProcessOps> Synch<P> {
    /// Allocates a semaphore with the given initial count.
    ///
    /// # Errors
    ///
    /// [`SyncError::PoolExhausted`] if every semaphore slot is in use.
    pub fn sem_create(&self, count: i32) -> Result<SemId, SyncError> {
        let mut tables = self.tables();
        let Some(index) = tables.sems.allocate(Semaphore::new(count)) else {
            kwarn!("synch: no free semaphore slots");
            return Err(SyncError::PoolExhausted);
        };
        ktrace!(Trace::SEM, "sem {}: created, count {}", index, count);
        Ok(SemId::new(index))
    }

    /// Decrements the semaphore, blocking first if the count is not
    /// positive.
    ///
    /// # Errors
    ///
    /// [`FatalError`] if the wait queue overflows.
    pub fn sem_wait(&self, sem: SemId) -> Result<(), FatalError> {
        let pid = self.processes().current_pid();
        let mut tables = self.tables();
        let index = sem.index();
        let entry = tables.sems.get_mut(index);

        let must_block = entry.count <= 0;
        if must_block {
            entry.waiting.enqueue(pid, QueueKind::Semaphore, index)?;
        }
        entry.count = entry.count.saturating_sub(1);
        ktrace!(
            Trace::SEM,
            "sem {}: wait by pid {}, count now {}{}",
            index,
            pid,
            entry.count,
            if must_block { ", blocking" } else { "" }
        );

        if must_block {
            self.block(&mut tables);
            ktrace!(Trace::SEM, "sem {}: pid {} resumed", index, pid);
        }
        Ok(())
    }

    /// Increments the semaphore and wakes the oldest waiter if it may now
    /// proceed.
    pub fn sem_signal(&self, sem: SemId) {
        let mut tables = self.tables();
        let index = sem.index();
        let entry = tables.sems.get_mut(index);

        entry.count = entry.count.saturating_add(1);
        ktrace!(Trace::SEM, "sem {}: signal, count now {}", index, entry.count);
        if entry.has_releasable_waiter() {
            if let Some(pid) = entry.waiting.pop_front() {
                ktrace!(Trace::SEM, "sem {}: waking pid {}", index, pid);
                self.processes().wakeup(pid);
            }
        }
    }

    /// [`sem_wait`](Self::sem_wait) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle, with no state
    /// changed; [`SyncError::Fatal`] if the wait queue overflows.
    pub fn sem_handle_wait(&self, raw: i32) -> Result<(), SyncError> {
        let sem = self.sem_validate(raw)?;
        Ok(self.sem_wait(sem)?)
    }

    /// [`sem_signal`](Self::sem_signal) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle, with no state changed.
    pub fn sem_handle_signal(&self, raw: i32) -> Result<(), SyncError> {
        let sem = self.sem_validate(raw)?;
        self.sem_signal(sem);
        Ok(())
    }

    /// Current count. Negative values count blocked waiters.
    pub fn sem_count(&self, sem: SemId) -> i32 {
        self.tables().sems.get(sem.index()).count
    }

    /// Number of processes blocked on the semaphore.
    pub fn sem_waiters(&self, sem: SemId) -> usize {
        self.tables().sems.get(sem.index()).waiting.len()
    }
}
