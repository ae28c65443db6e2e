//! Error types for synchronization operations.

use core::fmt;

/// Which kind of primitive owns a wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// A semaphore's waiters.
    Semaphore,
    /// A lock's waiters.
    Lock,
    /// A condition variable's waiters.
    Condition,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semaphore => f.write_str("semaphore"),
            Self::Lock => f.write_str("lock"),
            Self::Condition => f.write_str("condition"),
        }
    }
}

/// An unrecoverable failure. The kernel is expected to halt on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    /// A wait queue overflowed. Queues hold one entry per process, so this
    /// means the process table and the queue bookkeeping disagree.
    QueueFull {
        /// Kind of primitive whose queue overflowed.
        queue: QueueKind,
        /// Pool index of that primitive.
        index: usize,
    },
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { queue, index } => {
                write!(f, "{queue} {index}: wait queue full")
            }
        }
    }
}

impl core::error::Error for FatalError {}

/// Errors returned by synchronization operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The handle is out of range or names a free slot.
    InvalidHandle,
    /// Every slot of the pool is in use.
    PoolExhausted,
    /// A condition variable cannot be bound to a lock that is currently held.
    LockHeld,
    /// The caller does not hold the lock.
    NotOwner,
    /// The kernel cannot continue.
    Fatal(FatalError),
}

impl SyncError {
    /// Returns `true` if the kernel must halt.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Returns `true` for failures that can only come from a create call.
    pub const fn is_create_failure(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::LockHeld)
    }
}

impl From<FatalError> for SyncError {
    fn from(err: FatalError) -> Self {
        Self::Fatal(err)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHandle => f.write_str("invalid handle"),
            Self::PoolExhausted => f.write_str("no free slots"),
            Self::LockHeld => f.write_str("lock is held"),
            Self::NotOwner => f.write_str("caller does not own the lock"),
            Self::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

impl core::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Fatal(err) => Some(err),
            _ => None,
        }
    }
}
