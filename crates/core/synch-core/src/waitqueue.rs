//! Bounded FIFO of blocked processes.
//!
//! Every primitive owns one. Capacity is
//! [`MAX_WAITERS`](crate::config::MAX_WAITERS), the size of the process
//! table, so a full queue cannot happen while the bookkeeping is intact and
//! is reported as [`FatalError::QueueFull`].

use alloc::collections::VecDeque;

use crate::config::MAX_WAITERS;
use crate::error::{FatalError, QueueKind};
use crate::id::Pid;

/// Processes blocked on one primitive, oldest first.
#[derive(Debug)]
pub struct WaitQueue {
    waiters: VecDeque<Pid>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    /// Appends `pid`. `queue` and `index` name the owner for the diagnostic
    /// emitted when the queue is full.
    pub fn enqueue(&mut self, pid: Pid, queue: QueueKind, index: usize) -> Result<(), FatalError> {
        if self.waiters.len() >= MAX_WAITERS {
            kfatal!(
                "synch: {} {}: cannot enqueue pid {}, {} waiters already queued",
                queue,
                index,
                pid,
                self.waiters.len()
            );
            return Err(FatalError::QueueFull { queue, index });
        }
        self.waiters.push_back(pid);
        Ok(())
    }

    /// Removes and returns the oldest waiter.
    pub fn pop_front(&mut self) -> Option<Pid> {
        self.waiters.pop_front()
    }

    /// Number of waiters.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Returns `true` if `pid` is queued.
    pub fn contains(&self, pid: Pid) -> bool {
        self.waiters.contains(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut wq = WaitQueue::new();
        for n in 1..=3 {
            wq.enqueue(Pid::new(n), QueueKind::Lock, 0).unwrap();
        }
        assert_eq!(wq.len(), 3);
        assert_eq!(wq.pop_front(), Some(Pid::new(1)));
        assert_eq!(wq.pop_front(), Some(Pid::new(2)));
        assert_eq!(wq.pop_front(), Some(Pid::new(3)));
        assert_eq!(wq.pop_front(), None);
        assert_eq!(wq.len(), 0);
    }

    #[test]
    fn contains_queued_pid() {
        let mut wq = WaitQueue::new();
        wq.enqueue(Pid::new(9), QueueKind::Semaphore, 2).unwrap();
        assert!(wq.contains(Pid::new(9)));
        assert!(!wq.contains(Pid::new(10)));
    }

    #[test]
    fn full_queue_is_fatal() {
        let mut wq = WaitQueue::new();
        for n in 0..MAX_WAITERS {
            wq.enqueue(Pid::new(n as u32), QueueKind::Condition, 5).unwrap();
        }
        // One past capacity.
        assert_eq!(
            wq.enqueue(Pid::new(999), QueueKind::Condition, 5),
            Err(FatalError::QueueFull {
                queue: QueueKind::Condition,
                index: 5,
            })
        );
        assert_eq!(wq.len(), MAX_WAITERS);
        assert!(!wq.contains(Pid::new(999)));
    }
}
