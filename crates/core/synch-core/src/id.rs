//! Type-safe identifiers.
//!
//! Pool handles are plain slot indices on the wire. Inside the kernel they
//! are wrapped so a lock handle cannot be passed where a semaphore handle is
//! expected, and so that holding one means it was validated.
//!
//! A typed handle is only meaningful to the [`Synch`](crate::Synch) that
//! issued it. Passing it to another instance reaches whatever that instance
//! keeps in the same slot, and panics if the slot is free there.

use core::fmt;

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Creates a new `Pid`.
    pub const fn new(val: u32) -> Self {
        Self(val)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a slot index. Only the pool hands these out.
            #[allow(clippy::cast_possible_truncation)]
            pub(crate) const fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Returns the slot index.
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Returns the handle as passed across the syscall boundary.
            #[allow(clippy::cast_possible_wrap)]
            pub const fn as_raw(self) -> i32 {
                self.0 as i32
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_id!(
    /// Handle of an allocated semaphore.
    SemId
);

handle_id!(
    /// Handle of an allocated lock.
    LockId
);

handle_id!(
    /// Handle of an allocated condition variable.
    CondId
);
