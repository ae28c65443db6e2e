//! Semaphores, locks and condition variables for a single-CPU kernel.
//!
//! Each primitive lives in a fixed-size pool and is named by a small integer
//! handle. Kernel code that already holds a typed handle ([`SemId`],
//! [`LockId`], [`CondId`]) calls the reference-form operations on [`Synch`];
//! everything else goes through the handle-validated forms, or through the
//! integer syscall surface in [`abi`].
//!
//! The only mutual exclusion is interrupt masking ([`irq`]). Blocking and
//! waking are delegated to the kernel's process layer through
//! [`ProcessOps`], so this crate builds and tests on the host with threads
//! standing in for processes (see `host`, behind the `std` feature).

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
pub mod log;

pub mod abi;
pub mod config;
pub mod error;
pub mod id;
pub mod irq;
pub mod process;
pub mod synch;

mod compat;
mod cond;
mod lock;
mod pool;
mod semaphore;
mod waitqueue;

#[cfg(feature = "std")]
pub mod host;

pub use error::{FatalError, QueueKind, SyncError};
pub use id::{CondId, LockId, Pid, SemId};
pub use process::ProcessOps;
pub use synch::{PoolUsage, Synch};
