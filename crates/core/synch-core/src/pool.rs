//! Fixed pools of primitives named by slot index.
//!
//! A pool never grows and slots are never returned, so a handle stays valid
//! for the life of the kernel once allocated. Allocation scans from slot 0
//! and takes the first free slot.

use crate::log::Trace;

/// A primitive that can live in a [`HandlePool`].
pub trait PoolEntry {
    /// Contents of a slot that has never been allocated.
    const VACANT: Self;
}

#[derive(Debug)]
struct Slot<T> {
    in_use: bool,
    entry: T,
}

/// A fixed array of `N` slots.
#[derive(Debug)]
pub struct HandlePool<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T: PoolEntry, const N: usize> HandlePool<T, N> {
    /// Creates a pool with every slot free.
    pub const fn new() -> Self {
        Self {
            slots: [const {
                Slot {
                    in_use: false,
                    entry: T::VACANT,
                }
            }; N],
        }
    }

    /// Claims the lowest free slot and stores `entry` in it.
    ///
    /// Returns `None` when every slot is in use; the pool is unchanged.
    pub fn allocate(&mut self, entry: T) -> Option<usize> {
        let index = self.slots.iter().position(|slot| !slot.in_use)?;
        let slot = &mut self.slots[index];
        slot.in_use = true;
        slot.entry = entry;
        ktrace!(Trace::POOL, "pool: allocated slot {}/{}", index, N);
        Some(index)
    }

    /// Checks a raw handle, returning its index if it names an allocated
    /// slot.
    pub fn validate(&self, raw: i32) -> Option<usize> {
        let index = usize::try_from(raw).ok()?;
        let valid = self.slots.get(index).is_some_and(|slot| slot.in_use);
        if !valid {
            ktrace!(Trace::POOL, "pool: rejected handle {}", raw);
            return None;
        }
        Some(index)
    }

    /// Returns the entry at an allocated index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or names a free slot.
    pub fn get(&self, index: usize) -> &T {
        let slot = &self.slots[index];
        assert!(slot.in_use, "slot {index} is free");
        &slot.entry
    }

    /// Returns the entry at an allocated index mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range or names a free slot.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let slot = &mut self.slots[index];
        assert!(slot.in_use, "slot {index} is free");
        &mut slot.entry
    }

    /// Number of allocated slots.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_use).count()
    }
}
