// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Reader/writer lock for shared memory that survives its holders dying.
//
// The underlying `SharedRwMutex` is not robust. On top of it we record the
// exclusive owner's pid and every shared holder's pid. A blocked acquirer
// probes those pids and, for a holder that is provably dead, releases the
// mutex on its behalf. Every recovery is gated by a single CAS against the
// exact pid value that was probed, so of several racing recoverers exactly
// one performs the matching release.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{LockError, LockResult};
use crate::liveness::{current_pid, Liveness, ProcessTable};
use crate::lockless_set::{LocklessSet, DEFAULT_SHARED_OWNERS};
use crate::rw_lock::SharedRwMutex;

/// Pause between attempts of the blocking acquire loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(1);

/// Process-local identity used when talking to a `RobustLock`.
///
/// Bundles the pid recorded as owner, the liveness oracle consulted during
/// recovery, and the poll interval of the blocking loops. Never stored in
/// shared memory.
#[derive(Debug, Clone)]
pub struct LockContext<L = ProcessTable> {
    pid: u32,
    oracle: L,
    poll_interval: Duration,
}

impl LockContext<ProcessTable> {
    /// The calling process, probed through the OS process table.
    pub fn current() -> Self {
        Self::new(current_pid(), ProcessTable)
    }
}

impl<L: Liveness> LockContext<L> {
    /// # Panics
    /// Panics if `pid` is 0, which the lock reserves for "no owner".
    pub fn new(pid: u32, oracle: L) -> Self {
        assert_ne!(pid, 0, "pid 0 is reserved for \"no owner\"");
        Self {
            pid,
            oracle,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the pause between attempts. `Duration::ZERO` yields instead
    /// of sleeping.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn oracle(&self) -> &L {
        &self.oracle
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn pause(&self) {
        if self.poll_interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.poll_interval);
        }
    }
}

/// A crash-tolerant reader/writer lock meant to be placed in shared memory.
///
/// Holds one exclusive owner or many shared owners, tracked by pid. If a
/// holder dies without releasing, the next blocked acquirer that proves the
/// holder dead releases the lock for it.
///
/// `N` is the number of shared-owner slots, i.e. the largest number of
/// simultaneous shared holds. The all-zero byte pattern is a valid unlocked
/// lock, so a freshly created, zero-filled segment needs no initialisation.
///
/// Ownership is per process, not per thread: any thread of the owning
/// process may unlock, and a process must not take the exclusive lock
/// recursively.
///
/// Two failure windows are not recoverable: a process dying between winning
/// the underlying exclusive lock and recording its pid, or between winning
/// a shared hold and registering it. Both span a handful of instructions.
#[repr(C)]
pub struct RobustLock<const N: usize = DEFAULT_SHARED_OWNERS> {
    mutex: SharedRwMutex,
    exclusive_owner: AtomicU32,
    shared_owners: LocklessSet<N>,
}

impl RobustLock {
    /// An unlocked lock with the default number of shared-owner slots.
    pub const fn new() -> Self {
        Self::unlocked()
    }
}

impl<const N: usize> RobustLock<N> {
    /// An unlocked lock with `N` shared-owner slots.
    pub const fn unlocked() -> Self {
        Self {
            mutex: SharedRwMutex::new(),
            exclusive_owner: AtomicU32::new(0),
            shared_owners: LocklessSet::new(),
        }
    }

    /// View memory that already holds a lock (for example a mapped segment).
    ///
    /// # Safety
    /// `ptr` must be aligned for `RobustLock<N>`, point to at least
    /// `size_of::<RobustLock<N>>()` bytes that are zeroed or hold a lock, and
    /// stay mapped for `'a`.
    pub unsafe fn from_raw<'a>(ptr: *const u8) -> &'a Self {
        &*(ptr as *const Self)
    }

    /// Write a fresh unlocked lock at `ptr` and return a reference to it.
    ///
    /// Only the creator of a region may do this, before any other process
    /// can reach the memory.
    ///
    /// # Safety
    /// Same requirements as [`RobustLock::from_raw`], and no other reference
    /// to the memory may be in use.
    pub unsafe fn init_at<'a>(ptr: *mut u8) -> &'a Self {
        let lock = ptr as *mut Self;
        lock.write(Self::unlocked());
        &*lock
    }

    // ---------------------------------------------------------------------
    // Exclusive mode
    // ---------------------------------------------------------------------

    /// Acquire exclusively as the calling process. Blocks until acquired.
    pub fn lock(&self) {
        self.lock_with(&LockContext::current());
    }

    /// Single-shot exclusive acquire as the calling process.
    pub fn try_lock(&self) -> bool {
        self.try_lock_with(&LockContext::current())
    }

    /// Release an exclusive hold taken by the calling process.
    pub fn unlock(&self) {
        self.unlock_with(&LockContext::current());
    }

    /// Acquire exclusively as `cx`. Blocks until acquired.
    pub fn lock_with<L: Liveness>(&self, cx: &LockContext<L>) {
        while !self.mutex.try_lock() {
            if self.recover_for_writer(cx) {
                continue;
            }
            cx.pause();
        }
        self.exclusive_owner.store(cx.pid, Ordering::Release);
    }

    /// One recovery attempt and at most two acquire attempts; never blocks.
    pub fn try_lock_with<L: Liveness>(&self, cx: &LockContext<L>) -> bool {
        if !self.mutex.try_lock() {
            self.recover_for_writer(cx);
            if !self.mutex.try_lock() {
                return false;
            }
        }
        self.exclusive_owner.store(cx.pid, Ordering::Release);
        true
    }

    /// Release the exclusive hold if `cx` still owns it.
    ///
    /// A no-op when the hold was already reaped by another process, so the
    /// underlying mutex, possibly re-acquired since, is never released twice.
    pub fn unlock_with<L: Liveness>(&self, cx: &LockContext<L>) {
        if self
            .exclusive_owner
            .compare_exchange(cx.pid, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.mutex.unlock();
        } else {
            tracing::debug!(pid = cx.pid, "unlock by non-owner ignored");
        }
    }

    // ---------------------------------------------------------------------
    // Shared mode
    // ---------------------------------------------------------------------

    /// Acquire a shared hold as the calling process. Blocks until acquired.
    ///
    /// Fails with [`LockError::RegistryFull`] when all `N` slots belong to
    /// live holders; the hold is not kept in that case.
    pub fn lock_sharable(&self) -> LockResult<()> {
        self.lock_sharable_with(&LockContext::current())
    }

    /// Single-shot shared acquire as the calling process.
    pub fn try_lock_sharable(&self) -> LockResult<bool> {
        self.try_lock_sharable_with(&LockContext::current())
    }

    /// Release one shared hold of the calling process.
    pub fn unlock_sharable(&self) {
        self.unlock_sharable_with(&LockContext::current());
    }

    pub fn lock_sharable_with<L: Liveness>(&self, cx: &LockContext<L>) -> LockResult<()> {
        while !self.mutex.try_lock_shared() {
            if self.reap_exclusive(cx) {
                continue;
            }
            cx.pause();
        }
        self.register_shared(cx)
    }

    pub fn try_lock_sharable_with<L: Liveness>(&self, cx: &LockContext<L>) -> LockResult<bool> {
        if !self.mutex.try_lock_shared() {
            self.reap_exclusive(cx);
            if !self.mutex.try_lock_shared() {
                return Ok(false);
            }
        }
        self.register_shared(cx).map(|()| true)
    }

    /// Release one shared hold of `cx`. Only the call that clears a registry
    /// slot releases the underlying mutex; a hold already reaped is a no-op.
    pub fn unlock_sharable_with<L: Liveness>(&self, cx: &LockContext<L>) {
        if self.shared_owners.remove(cx.pid) {
            self.mutex.unlock_shared();
        } else {
            tracing::debug!(pid = cx.pid, "unlock_sharable without a registered hold ignored");
        }
    }

    // ---------------------------------------------------------------------
    // Recovery
    // ---------------------------------------------------------------------

    /// Release the shared holds of every registered process that is dead
    /// according to the OS. Returns how many holds were released.
    pub fn prune_readers(&self) -> usize {
        self.prune_readers_with(&ProcessTable)
    }

    /// Release the shared holds of every registered process `oracle`
    /// reports dead. Returns how many holds were released.
    pub fn prune_readers_with<L: Liveness>(&self, oracle: &L) -> usize {
        let mut released = 0;
        for pid in self.shared_owners.iter() {
            if oracle.is_dead(pid) && self.shared_owners.remove(pid) {
                self.mutex.unlock_shared();
                tracing::warn!(dead_pid = pid, "released shared hold of dead process");
                released += 1;
            }
        }
        released
    }

    /// A writer is blocked by either an exclusive owner or by readers.
    fn recover_for_writer<L: Liveness>(&self, cx: &LockContext<L>) -> bool {
        if self.exclusive_owner.load(Ordering::Acquire) != 0 {
            self.reap_exclusive(cx)
        } else {
            self.prune_readers_with(&cx.oracle) > 0
        }
    }

    /// Release the exclusive hold of a dead owner. `true` only for the one
    /// caller whose CAS cleared the probed pid.
    fn reap_exclusive<L: Liveness>(&self, cx: &LockContext<L>) -> bool {
        let owner = self.exclusive_owner.load(Ordering::Acquire);
        if owner == 0 || !cx.oracle.is_dead(owner) {
            return false;
        }
        // CAS against the probed snapshot, never a re-read: the slot may
        // have been released and re-acquired by a live process meanwhile.
        if self
            .exclusive_owner
            .compare_exchange(owner, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        self.mutex.unlock();
        tracing::warn!(
            dead_pid = owner,
            by = cx.pid,
            "released exclusive hold of dead process"
        );
        true
    }

    /// Record `cx` as a shared holder of the already acquired mutex.
    fn register_shared<L: Liveness>(&self, cx: &LockContext<L>) -> LockResult<()> {
        loop {
            if self.shared_owners.insert(cx.pid) {
                return Ok(());
            }
            if !self.shared_owners.is_full() {
                // lost a race for a free slot
                continue;
            }
            tracing::debug!(pid = cx.pid, capacity = N, "shared-owner registry full, pruning");
            if self.prune_readers_with(&cx.oracle) == 0 && self.shared_owners.is_full() {
                self.mutex.unlock_shared();
                tracing::warn!(
                    pid = cx.pid,
                    capacity = N,
                    "shared-owner registry full of live holders"
                );
                return Err(LockError::RegistryFull { capacity: N });
            }
        }
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// Pid recorded as exclusive owner, if any.
    pub fn exclusive_owner(&self) -> Option<u32> {
        match self.exclusive_owner.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Snapshot of the pids holding shared access, one entry per hold.
    pub fn shared_owners(&self) -> Vec<u32> {
        self.shared_owners.iter().collect()
    }

    /// The underlying non-robust mutex.
    pub fn raw_mutex(&self) -> &SharedRwMutex {
        &self.mutex
    }

    /// Number of shared-owner slots.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Clone for RobustLock<N> {
    /// Copies the mutex word, owner and registry into an independent lock.
    /// Used when relocating a lock during region setup, not for aliasing.
    fn clone(&self) -> Self {
        Self {
            mutex: self.mutex.clone(),
            exclusive_owner: AtomicU32::new(self.exclusive_owner.load(Ordering::Acquire)),
            shared_owners: self.shared_owners.clone(),
        }
    }
}

impl<const N: usize> Drop for RobustLock<N> {
    // Only the local value is cleared. Copies living in a mapped segment are
    // never dropped through here and outlive any one process.
    fn drop(&mut self) {
        *self.exclusive_owner.get_mut() = 0;
    }
}

impl Default for RobustLock {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RobustLock<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobustLock")
            .field("exclusive_owner", &self.exclusive_owner())
            .field("shared_owners", &self.shared_owners)
            .field("mutex", &self.mutex)
            .finish()
    }
}
