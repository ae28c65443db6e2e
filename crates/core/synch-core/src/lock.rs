//! Mutual-exclusion locks with direct hand-off.
//!
//! Release never leaves the lock free while someone is waiting: the oldest
//! waiter becomes the owner before it is woken, so a third process cannot
//! slip in between. Acquiring a lock you already own is a no-op, and one
//! release frees it no matter how many times it was acquired.

use crate::error::{FatalError, QueueKind, SyncError};
use crate::id::{LockId, Pid};
use crate::log::Trace;
use crate::pool::PoolEntry;
use crate::process::ProcessOps;
use crate::synch::Synch;
use crate::waitqueue::WaitQueue;

/// A binary lock with an owner and a FIFO queue of blocked processes.
#[derive(Debug)]
pub(crate) struct Lock {
    owner: Option<Pid>,
    waiting: WaitQueue,
}

impl Lock {
    pub(crate) fn owner(&self) -> Option<Pid> {
        self.owner
    }

    pub(crate) fn is_owned_by(&self, pid: Pid) -> bool {
        self.owner == Some(pid)
    }

    /// Sets the owner without touching the queue.
    pub(crate) fn claim(&mut self, pid: Pid) {
        self.owner = Some(pid);
    }

    /// Passes ownership to the oldest waiter and wakes it, or frees the lock
    /// if nobody waits. Returns the new owner.
    pub(crate) fn hand_off(&mut self, procs: &impl ProcessOps) -> Option<Pid> {
        self.owner = self.waiting.pop_front();
        if let Some(next) = self.owner {
            procs.wakeup(next);
        }
        self.owner
    }
}

impl PoolEntry for Lock {
    const VACANT: Self = Self {
        owner: None,
        waiting: WaitQueue::new(),
    };
}

impl<P: ProcessOps> Synch<P> {
    /// Allocates an unowned lock.
    ///
    /// # Errors
    ///
    /// [`SyncError::PoolExhausted`] if every lock slot is in use.
    pub fn lock_create(&self) -> Result<LockId, SyncError> {
        let mut tables = self.tables();
        let Some(index) = tables.locks.allocate(Lock::VACANT) else {
            kwarn!("synch: no free lock slots");
            return Err(SyncError::PoolExhausted);
        };
        ktrace!(Trace::LOCK, "lock {}: created", index);
        Ok(LockId::new(index))
    }

    /// Acquires the lock, blocking while another process owns it.
    ///
    /// Returns at once if the caller already owns the lock.
    ///
    /// # Errors
    ///
    /// [`FatalError`] if the wait queue overflows.
    pub fn lock_acquire(&self, lock: LockId) -> Result<(), FatalError> {
        let pid = self.processes().current_pid();
        let mut tables = self.tables();
        let index = lock.index();
        let entry = tables.locks.get_mut(index);

        match entry.owner {
            Some(owner) if owner == pid => {
                ktrace!(Trace::LOCK, "lock {}: pid {} already owns it", index, pid);
            }
            Some(owner) => {
                entry.waiting.enqueue(pid, QueueKind::Lock, index)?;
                ktrace!(
                    Trace::LOCK,
                    "lock {}: pid {} blocks behind owner {}",
                    index,
                    pid,
                    owner
                );
                // The releaser makes us the owner before waking us.
                self.block(&mut tables);
                ktrace!(Trace::LOCK, "lock {}: handed to pid {}", index, pid);
            }
            None => {
                entry.owner = Some(pid);
                ktrace!(Trace::LOCK, "lock {}: acquired by pid {}", index, pid);
            }
        }
        Ok(())
    }

    /// Releases the lock, handing it to the oldest waiter if there is one.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotOwner`] if the caller does not own the lock. The lock
    /// is left untouched.
    pub fn lock_release(&self, lock: LockId) -> Result<(), SyncError> {
        let pid = self.processes().current_pid();
        let mut tables = self.tables();
        let index = lock.index();
        let entry = tables.locks.get_mut(index);

        if !entry.is_owned_by(pid) {
            kwarn!(
                "synch: lock {}: release by pid {} but owner is {:?}",
                index,
                pid,
                entry.owner
            );
            return Err(SyncError::NotOwner);
        }
        match entry.hand_off(self.processes()) {
            Some(next) => {
                ktrace!(Trace::LOCK, "lock {}: pid {} hands off to {}", index, pid, next);
            }
            None => ktrace!(Trace::LOCK, "lock {}: released by pid {}", index, pid),
        }
        Ok(())
    }

    /// [`lock_acquire`](Self::lock_acquire) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle, with no state
    /// changed; [`SyncError::Fatal`] if the wait queue overflows.
    pub fn lock_handle_acquire(&self, raw: i32) -> Result<(), SyncError> {
        let lock = self.lock_validate(raw)?;
        Ok(self.lock_acquire(lock)?)
    }

    /// [`lock_release`](Self::lock_release) on a raw handle.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidHandle`] for a bad handle and
    /// [`SyncError::NotOwner`] if the caller does not own the lock. Neither
    /// changes any state.
    pub fn lock_handle_release(&self, raw: i32) -> Result<(), SyncError> {
        let lock = self.lock_validate(raw)?;
        self.lock_release(lock)
    }

    /// Current owner, if any.
    pub fn lock_owner(&self, lock: LockId) -> Option<Pid> {
        self.tables().locks.get(lock.index()).owner()
    }

    /// Number of processes blocked on the lock.
    pub fn lock_waiters(&self, lock: LockId) -> usize {
        self.tables().locks.get(lock.index()).waiting.len()
    }
}

#[cfg(all(test, feature = "std", not(shuttle)))]
mod tests {
    use std::sync::Arc;

    use crate::config::{MAX_LOCKS, MAX_WAITERS};
    use crate::host::HostProcesses;
    use crate::irq;
    use crate::{FatalError, ProcessOps, QueueKind, SyncError, Synch};

    fn synch() -> Arc<Synch<HostProcesses>> {
        Arc::new(Synch::new(HostProcesses::new()))
    }

    #[test]
    fn uncontended_acquire_and_release() {
        let synch = synch();
        let me = synch.processes().current_pid();
        let lock = synch.lock_create().unwrap();
        assert_eq!(synch.lock_owner(lock), None);

        synch.lock_acquire(lock).unwrap();
        assert_eq!(synch.lock_owner(lock), Some(me));
        synch.lock_release(lock).unwrap();
        assert_eq!(synch.lock_owner(lock), None);
        assert!(irq::enabled());
    }

    #[test]
    fn reentrant_acquire_does_not_count() {
        let synch = synch();
        let lock = synch.lock_create().unwrap();
        synch.lock_acquire(lock).unwrap();
        synch.lock_acquire(lock).unwrap();
        synch.lock_acquire(lock).unwrap();
        assert_eq!(synch.lock_waiters(lock), 0);

        synch.lock_release(lock).unwrap();
        assert_eq!(synch.lock_owner(lock), None);
        assert_eq!(synch.lock_release(lock), Err(SyncError::NotOwner));
    }

    #[test]
    fn release_by_non_owner_fails_and_keeps_owner() {
        let synch = synch();
        let procs = synch.processes();
        let lock = synch.lock_create().unwrap();

        let owner = {
            let synch = Arc::clone(&synch);
            procs.spawn(move || {
                synch.lock_acquire(lock).unwrap();
                synch.processes().current_pid()
            })
        };
        let owner = owner.join();
        assert_eq!(synch.lock_owner(lock), Some(owner));

        assert_eq!(synch.lock_release(lock), Err(SyncError::NotOwner));
        assert_eq!(synch.lock_owner(lock), Some(owner));
        assert!(irq::enabled(), "failed release restores interrupts");
    }

    #[test]
    fn release_hands_off_to_waiter() {
        let synch = synch();
        let procs = synch.processes();
        let lock = synch.lock_create().unwrap();
        synch.lock_acquire(lock).unwrap();

        let child = {
            let synch = Arc::clone(&synch);
            procs.spawn(move || {
                synch.lock_acquire(lock).unwrap();
                synch.lock_owner(lock)
            })
        };
        procs.wait_until_sleeping(child.pid());
        assert_eq!(synch.lock_waiters(lock), 1);

        let child_pid = child.pid();
        synch.lock_release(lock).unwrap();
        assert_eq!(synch.lock_owner(lock), Some(child_pid));
        assert_eq!(child.join(), Some(child_pid), "woken already owning it");

        // No longer the owner.
        assert_eq!(synch.lock_release(lock), Err(SyncError::NotOwner));
        assert_eq!(synch.lock_owner(lock), Some(child_pid));
    }

    #[test]
    fn hand_off_is_fifo() {
        let synch = synch();
        let procs = synch.processes();
        let lock = synch.lock_create().unwrap();
        synch.lock_acquire(lock).unwrap();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let children: Vec<_> = (0..3)
            .map(|_| {
                let synch = Arc::clone(&synch);
                let order = Arc::clone(&order);
                let child = procs.spawn(move || {
                    synch.lock_acquire(lock).unwrap();
                    let me = synch.processes().current_pid();
                    order.lock().unwrap().push(me);
                    synch.lock_release(lock).unwrap();
                });
                procs.wait_until_sleeping(child.pid());
                child
            })
            .collect();
        let expected: Vec<_> = children.iter().map(|child| child.pid()).collect();
        assert_eq!(synch.lock_waiters(lock), 3);

        synch.lock_release(lock).unwrap();
        for child in children {
            child.join();
        }
        assert_eq!(*order.lock().unwrap(), expected);
        assert_eq!(synch.lock_owner(lock), None);
    }

    #[test]
    fn never_two_owners() {
        let synch = synch();
        let procs = synch.processes();
        let lock = synch.lock_create().unwrap();
        let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let children: Vec<_> = (0..4)
            .map(|_| {
                let synch = Arc::clone(&synch);
                let inside = Arc::clone(&inside);
                procs.spawn(move || {
                    use std::sync::atomic::Ordering;
                    for _ in 0..200 {
                        synch.lock_acquire(lock).unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        assert_eq!(
                            synch.lock_owner(lock),
                            Some(synch.processes().current_pid())
                        );
                        inside.fetch_sub(1, Ordering::SeqCst);
                        synch.lock_release(lock).unwrap();
                    }
                })
            })
            .collect();
        for child in children {
            child.join();
        }
        assert_eq!(synch.lock_owner(lock), None);
    }

    #[test]
    fn handle_forms_reject_bad_handles_without_side_effects() {
        let synch = synch();
        let lock = synch.lock_create().unwrap();
        for raw in [-1, lock.as_raw() + 1, MAX_LOCKS as i32] {
            assert_eq!(synch.lock_handle_acquire(raw), Err(SyncError::InvalidHandle));
            assert_eq!(synch.lock_handle_release(raw), Err(SyncError::InvalidHandle));
        }
        assert_eq!(synch.lock_owner(lock), None);

        synch.lock_handle_acquire(lock.as_raw()).unwrap();
        synch.lock_handle_release(lock.as_raw()).unwrap();
        assert_eq!(
            synch.lock_handle_release(lock.as_raw()),
            Err(SyncError::NotOwner)
        );
    }

    #[test]
    fn pool_exhaustion() {
        let synch = synch();
        for _ in 0..MAX_LOCKS {
            synch.lock_create().unwrap();
        }
        assert_eq!(synch.lock_create(), Err(SyncError::PoolExhausted));
    }

    #[test]
    fn queue_overflow_is_fatal() {
        let synch = synch();
        let procs = synch.processes();
        let lock = synch.lock_create().unwrap();
        synch.lock_acquire(lock).unwrap();

        let children: Vec<_> = (0..MAX_WAITERS)
            .map(|_| {
                let synch = Arc::clone(&synch);
                let child = procs.spawn(move || {
                    synch.lock_acquire(lock).unwrap();
                    synch.lock_release(lock).unwrap();
                });
                procs.wait_until_sleeping(child.pid());
                child
            })
            .collect();
        assert_eq!(synch.lock_waiters(lock), MAX_WAITERS);

        // The interrupt mask is per thread, so check it where the call ran.
        let overflow = {
            let synch = Arc::clone(&synch);
            procs.spawn(move || (synch.lock_acquire(lock), irq::enabled()))
        };
        let (result, enabled) = overflow.join();
        assert_eq!(
            result,
            Err(FatalError::QueueFull {
                queue: QueueKind::Lock,
                index: lock.index(),
            })
        );
        assert!(enabled, "fatal path restores interrupts");
        assert_eq!(synch.lock_waiters(lock), MAX_WAITERS);
        assert_eq!(synch.lock_owner(lock), Some(synch.processes().current_pid()));

        synch.lock_release(lock).unwrap();
        for child in children {
            child.join();
        }
        assert_eq!(synch.lock_owner(lock), None);
    }
}
