// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared-memory segment handle.

use std::io;

use crate::platform::{PlatformShm, ShmMode};

/// Open mode for shared memory segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively; fail if already exists.
    Create,
    /// Open existing; fail if it does not exist.
    Open,
    /// Create if missing, open if it already exists.
    CreateOrOpen,
}

impl From<ShmOpenMode> for ShmMode {
    fn from(mode: ShmOpenMode) -> Self {
        match mode {
            ShmOpenMode::Create => ShmMode::Create,
            ShmOpenMode::Open => ShmMode::Open,
            ShmOpenMode::CreateOrOpen => ShmMode::CreateOrOpen,
        }
    }
}

/// A named region of memory mapped by several processes.
///
/// The mapping carries a trailing `AtomicI32` counting live handles across
/// all processes; the handle that drops it to zero unlinks the name. A
/// process that dies never decrements it, so a crashed mapper keeps the
/// name alive until `unlink` / `unlink_by_name` is called.
pub struct ShmHandle {
    inner: PlatformShm,
}

impl ShmHandle {
    /// Map `size` usable bytes of the segment `name`.
    pub fn acquire(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        let inner = PlatformShm::acquire(name, size, mode.into())?;
        Ok(Self { inner })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Total mapped size (including the trailing ref counter).
    pub fn mapped_size(&self) -> usize {
        self.inner.mapped_size()
    }

    /// User-requested size (the usable portion).
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// POSIX object name, with its leading '/'.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// `true` if this handle was the first to map the segment.
    pub fn is_creator(&self) -> bool {
        self.inner.prev_ref_count() == 0
    }

    /// Number of live handles mapping this segment, across processes.
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// Force-remove the backing object. Existing mappings stay valid.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named segment without an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}

impl std::fmt::Debug for ShmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmHandle")
            .field("name", &self.name())
            .field("user_size", &self.user_size())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
