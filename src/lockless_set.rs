// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-capacity lock-free set of process ids, embedded in shared memory.
// Each slot is an AtomicU32; 0 marks an empty slot.

use std::sync::atomic::{AtomicU32, Ordering};

/// Default number of shared-owner slots carried by a `RobustLock`.
pub const DEFAULT_SHARED_OWNERS: usize = 32;

/// A bounded, lock-free multiset of non-zero pids.
///
/// The same pid may occupy several slots (one per outstanding shared hold
/// taken by that process). All operations are single CAS steps on one slot,
/// so concurrent callers from different processes never block each other.
#[repr(C)]
pub struct LocklessSet<const N: usize = DEFAULT_SHARED_OWNERS> {
    slots: [AtomicU32; N],
}

impl<const N: usize> LocklessSet<N> {
    /// Create an empty set.
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicU32::new(0) }; N],
        }
    }

    /// Claim an empty slot for `pid`.
    ///
    /// Returns `false` if every slot was taken during the scan (either full
    /// or lost races for the free ones); callers retry. `pid == 0` is rejected.
    pub fn insert(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        self.slots.iter().any(|slot| {
            slot.load(Ordering::Relaxed) == 0
                && slot
                    .compare_exchange(0, pid, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
        })
    }

    /// Clear one slot holding `pid`.
    ///
    /// Returns `true` only for the call whose CAS actually emptied a slot.
    pub fn remove(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        self.slots.iter().any(|slot| {
            slot.load(Ordering::Relaxed) == pid
                && slot
                    .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
        })
    }

    pub fn contains(&self, pid: u32) -> bool {
        pid != 0 && self.iter().any(|p| p == pid)
    }

    /// Snapshot scan of the occupied slots. Entries may change under the scan.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&pid| pid != 0)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Clone for LocklessSet<N> {
    fn clone(&self) -> Self {
        Self {
            slots: std::array::from_fn(|i| AtomicU32::new(self.slots[i].load(Ordering::Acquire))),
        }
    }
}

impl<const N: usize> Default for LocklessSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for LocklessSet<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
