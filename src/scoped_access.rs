// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RAII guards over a RobustLock: acquire on construction, release on drop.
// ScopedWrite / ScopedRead additionally expose the data region that a
// NamedRobustLock maps next to its lock.

use std::io;

use crate::error::LockResult;
use crate::liveness::{Liveness, ProcessTable};
use crate::lockless_set::DEFAULT_SHARED_OWNERS;
use crate::robust_lock::{LockContext, RobustLock};

/// Exclusive hold, released on drop.
pub struct ExclusiveAccess<'a, const N: usize = DEFAULT_SHARED_OWNERS, L: Liveness = ProcessTable> {
    lock: &'a RobustLock<N>,
    cx: LockContext<L>,
}

impl<'a, const N: usize, L: Liveness> ExclusiveAccess<'a, N, L> {
    /// Block until `lock` is held exclusively by `cx`.
    pub fn new(lock: &'a RobustLock<N>, cx: LockContext<L>) -> Self {
        lock.lock_with(&cx);
        Self { lock, cx }
    }

    pub fn try_new(lock: &'a RobustLock<N>, cx: LockContext<L>) -> Option<Self> {
        lock.try_lock_with(&cx).then(|| Self { lock, cx })
    }

    pub fn lock(&self) -> &RobustLock<N> {
        self.lock
    }

    pub fn context(&self) -> &LockContext<L> {
        &self.cx
    }
}

impl<const N: usize, L: Liveness> Drop for ExclusiveAccess<'_, N, L> {
    fn drop(&mut self) {
        self.lock.unlock_with(&self.cx);
    }
}

/// Shared hold, released on drop.
pub struct SharedAccess<'a, const N: usize = DEFAULT_SHARED_OWNERS, L: Liveness = ProcessTable> {
    lock: &'a RobustLock<N>,
    cx: LockContext<L>,
}

impl<'a, const N: usize, L: Liveness> SharedAccess<'a, N, L> {
    /// Block until `cx` holds `lock` in shared mode.
    pub fn new(lock: &'a RobustLock<N>, cx: LockContext<L>) -> LockResult<Self> {
        lock.lock_sharable_with(&cx)?;
        Ok(Self { lock, cx })
    }

    pub fn try_new(lock: &'a RobustLock<N>, cx: LockContext<L>) -> LockResult<Option<Self>> {
        Ok(lock
            .try_lock_sharable_with(&cx)?
            .then(|| Self { lock, cx }))
    }

    pub fn lock(&self) -> &RobustLock<N> {
        self.lock
    }

    pub fn context(&self) -> &LockContext<L> {
        &self.cx
    }
}

impl<const N: usize, L: Liveness> Drop for SharedAccess<'_, N, L> {
    fn drop(&mut self) {
        self.lock.unlock_sharable_with(&self.cx);
    }
}

impl<const N: usize> RobustLock<N> {
    /// Exclusive guard for the calling process.
    pub fn write(&self) -> ExclusiveAccess<'_, N> {
        ExclusiveAccess::new(self, LockContext::current())
    }

    pub fn try_write(&self) -> Option<ExclusiveAccess<'_, N>> {
        ExclusiveAccess::try_new(self, LockContext::current())
    }

    /// Shared guard for the calling process.
    pub fn read(&self) -> LockResult<SharedAccess<'_, N>> {
        SharedAccess::new(self, LockContext::current())
    }

    pub fn try_read(&self) -> LockResult<Option<SharedAccess<'_, N>>> {
        SharedAccess::try_new(self, LockContext::current())
    }
}

/// Exclusive hold plus mutable access to a mapped data region.
pub struct ScopedWrite<'a> {
    _guard: ExclusiveAccess<'a>,
    data: *mut u8,
    len: usize,
}

impl<'a> ScopedWrite<'a> {
    /// # Safety
    /// `data..data + len` must stay mapped for `'a` and be guarded by the
    /// lock behind `guard`.
    pub(crate) unsafe fn new(guard: ExclusiveAccess<'a>, data: *mut u8, len: usize) -> Self {
        Self {
            _guard: guard,
            data,
            len,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }

    /// Copy `buf` to the start of the region.
    ///
    /// # Errors
    /// Returns `InvalidInput` if `buf` is larger than the region.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if buf.len() > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "buffer too large for data region ({} > {})",
                    buf.len(),
                    self.len
                ),
            ));
        }
        self.as_mut_slice()[..buf.len()].copy_from_slice(buf);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Shared hold plus read access to a mapped data region.
pub struct ScopedRead<'a> {
    _guard: SharedAccess<'a>,
    data: *const u8,
    len: usize,
}

impl<'a> ScopedRead<'a> {
    /// # Safety
    /// `data..data + len` must stay mapped for `'a` and be guarded by the
    /// lock behind `guard`.
    pub(crate) unsafe fn new(guard: SharedAccess<'a>, data: *const u8, len: usize) -> Self {
        Self {
            _guard: guard,
            data,
            len,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
