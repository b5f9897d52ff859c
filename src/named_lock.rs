// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A RobustLock living in a named shared memory segment, optionally followed
// by a data region it guards.
//
// Segment layout:
//   [ RobustLock | pad to DATA_ALIGN | data (data_size bytes) | ref counter ]

use std::io;
use std::ops::Deref;

use crate::error::LockResult;
use crate::scoped_access::{ScopedRead, ScopedWrite};
use crate::{RobustLock, ShmHandle, ShmOpenMode};

const DATA_ALIGN: usize = 16;
const DATA_OFFSET: usize = std::mem::size_of::<RobustLock>().div_ceil(DATA_ALIGN) * DATA_ALIGN;

/// A named, inter-process robust lock.
///
/// Every process that opens the same name maps the same lock. The segment
/// is created zero-filled, which is an unlocked `RobustLock`, so the
/// creator never writes the lock state and a concurrent opener can use it
/// immediately. The name is unlinked when the last handle drops; a crashed
/// process leaves its reference behind, in which case `clear_storage`
/// removes the name.
pub struct NamedRobustLock {
    shm: ShmHandle,
    data_size: usize,
}

impl NamedRobustLock {
    /// Open (or create) a named lock with no data region.
    pub fn open(name: &str) -> io::Result<Self> {
        Self::open_with_data(name, 0)
    }

    /// Open (or create) a named lock followed by `data_size` bytes of
    /// zero-initialised shared data.
    ///
    /// All processes must agree on `data_size`; opening an existing segment
    /// with a different size fails with `InvalidData`.
    pub fn open_with_data(name: &str, data_size: usize) -> io::Result<Self> {
        let shm = ShmHandle::acquire(name, DATA_OFFSET + data_size, ShmOpenMode::CreateOrOpen)?;
        tracing::debug!(
            name = shm.name(),
            creator = shm.is_creator(),
            data_size,
            "opened named robust lock"
        );
        Ok(Self { shm, data_size })
    }

    /// The shared lock itself.
    pub fn as_lock(&self) -> &RobustLock {
        // Safety: the mapping is page aligned, at least DATA_OFFSET bytes
        // long, zero-filled at creation, and lives as long as `self`.
        unsafe { RobustLock::from_raw(self.shm.as_ptr()) }
    }

    /// Whether this handle created the segment.
    pub fn is_creator(&self) -> bool {
        self.shm.is_creator()
    }

    /// POSIX object name of the backing segment.
    pub fn name(&self) -> &str {
        self.shm.name()
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Start of the data region. Access must be guarded by the lock.
    pub fn data_ptr(&self) -> *mut u8 {
        unsafe { self.shm.as_mut_ptr().add(DATA_OFFSET) }
    }

    /// Block for exclusive access to the data region.
    pub fn write_access(&self) -> ScopedWrite<'_> {
        let guard = self.as_lock().write();
        unsafe { ScopedWrite::new(guard, self.data_ptr(), self.data_size) }
    }

    pub fn try_write_access(&self) -> Option<ScopedWrite<'_>> {
        let guard = self.as_lock().try_write()?;
        Some(unsafe { ScopedWrite::new(guard, self.data_ptr(), self.data_size) })
    }

    /// Block for shared access to the data region.
    pub fn read_access(&self) -> LockResult<ScopedRead<'_>> {
        let guard = self.as_lock().read()?;
        Ok(unsafe { ScopedRead::new(guard, self.data_ptr(), self.data_size) })
    }

    /// Remove the backing segment of a named lock.
    pub fn clear_storage(name: &str) {
        ShmHandle::unlink_by_name(name);
    }
}

impl Deref for NamedRobustLock {
    type Target = RobustLock;

    fn deref(&self) -> &RobustLock {
        self.as_lock()
    }
}

impl std::fmt::Debug for NamedRobustLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedRobustLock")
            .field("shm", &self.shm)
            .field("lock", self.as_lock())
            .finish()
    }
}
