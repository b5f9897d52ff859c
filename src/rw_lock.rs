// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-word atomic reader/writer mutex that can live in shared memory.
// - High bit (W_FLAG) marks the exclusive holder.
// - Low bits count concurrent shared holders.
//
// This primitive is not robust: a holder that dies leaves its bit or its
// count behind. `RobustLock` layers owner tracking on top to repair that.

use std::sync::atomic::{AtomicU32, Ordering};

const W_MASK: u32 = i32::MAX as u32; // 0x7FFF_FFFF, reader count mask
const W_FLAG: u32 = W_MASK + 1; // 0x8000_0000, writer flag

/// A non-blocking, process-shared reader/writer mutex.
///
/// Either one exclusive holder or up to `2^31 - 1` shared holders. The
/// zero word is the unlocked state, so a zero-filled mapping is a valid
/// unlocked mutex.
#[repr(C)]
pub struct SharedRwMutex {
    lc: AtomicU32,
}

impl SharedRwMutex {
    /// Create a new unlocked mutex.
    pub const fn new() -> Self {
        Self {
            lc: AtomicU32::new(0),
        }
    }

    /// Try to take the exclusive lock. Fails if any holder is present.
    pub fn try_lock(&self) -> bool {
        self.lc
            .compare_exchange(0, W_FLAG, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Try to take a shared lock. Fails only while an exclusive holder is present.
    pub fn try_lock_shared(&self) -> bool {
        let mut old = self.lc.load(Ordering::Acquire);
        loop {
            if old & W_FLAG != 0 || old & W_MASK == W_MASK {
                return false;
            }
            match self.lc.compare_exchange_weak(
                old,
                old + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                // another reader moved the count; not a conflict
                Err(cur) => old = cur,
            }
        }
    }

    /// Release the exclusive lock.
    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }

    /// Release one shared hold.
    pub fn unlock_shared(&self) {
        let prev = self.lc.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & W_MASK != 0, "unlock_shared without a shared holder");
    }

    /// Whether the exclusive bit is currently set.
    pub fn is_locked_exclusive(&self) -> bool {
        self.lc.load(Ordering::Acquire) & W_FLAG != 0
    }

    /// Number of shared holds currently outstanding.
    pub fn readers(&self) -> u32 {
        self.lc.load(Ordering::Acquire) & W_MASK
    }
}

impl Clone for SharedRwMutex {
    /// Copies the raw lock word. The copy is independent state.
    fn clone(&self) -> Self {
        Self {
            lc: AtomicU32::new(self.lc.load(Ordering::Acquire)),
        }
    }
}

impl Default for SharedRwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedRwMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRwMutex")
            .field("exclusive", &self.is_locked_exclusive())
            .field("readers", &self.readers())
            .finish()
    }
}
