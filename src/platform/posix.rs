// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shared memory segments and process-liveness probing.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::shm_name;

// ---------------------------------------------------------------------------
// Layout helpers: the user region is followed by an AtomicI32 counter
// ---------------------------------------------------------------------------

const ALIGN: usize = std::mem::align_of::<AtomicI32>();

pub(crate) fn calc_size(user_size: usize) -> usize {
    let aligned = user_size.div_ceil(ALIGN) * ALIGN;
    aligned + std::mem::size_of::<AtomicI32>()
}

/// Reference to the trailing ref counter of a mapped region.
///
/// # Safety
/// `mem` must point to a live mapping of at least `total_size` bytes.
unsafe fn acc_of<'a>(mem: *mut u8, total_size: usize) -> &'a AtomicI32 {
    let offset = total_size - std::mem::size_of::<AtomicI32>();
    &*(mem.add(offset) as *const AtomicI32)
}

// ---------------------------------------------------------------------------
// PlatformShm: POSIX shared memory
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,      // total mapped size (including ref counter)
    user_size: usize, // user-requested size
    name: String,     // POSIX name (with leading '/')
    prev_ref: i32,    // ref count before our fetch_add (0 means we were first)
}

// Safety: the mapping is process-shared; every access through it goes
// through atomics or caller-synchronised raw pointers.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

fn shm_open(c_name: &CString, flags: libc::c_int, perms: libc::mode_t) -> io::Result<i32> {
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, perms as libc::c_uint) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

impl PlatformShm {
    /// Open or create a named segment with `user_size` usable bytes.
    ///
    /// A newly created segment is zero-filled by `ftruncate`.
    pub fn acquire(name: &str, user_size: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if user_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }

        let posix_name = shm_name::make_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let perms: libc::mode_t = 0o666;
        let total_size = calc_size(user_size);
        let exclusive = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL;

        // Only the process that actually created the object truncates it;
        // resizing an already-sized object can wipe live state on some kernels.
        let (fd, created) = match mode {
            ShmMode::Create => (shm_open(&c_name, exclusive, perms)?, true),
            ShmMode::Open => (shm_open(&c_name, libc::O_RDWR, perms)?, false),
            ShmMode::CreateOrOpen => match shm_open(&c_name, exclusive, perms) {
                Ok(fd) => (fd, true),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                    (shm_open(&c_name, libc::O_RDWR, perms)?, false)
                }
                Err(e) => return Err(e),
            },
        };

        unsafe { libc::fchmod(fd, perms) };

        if created {
            let ret = unsafe { libc::ftruncate(fd, total_size as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(err);
            }
        } else {
            // The ref counter sits at the end, so every mapper must agree on
            // the size. This also refuses an object whose creator has not
            // run ftruncate yet instead of faulting on first access.
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            if unsafe { libc::fstat(fd, &mut st) } != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
            if !size_matches(st.st_size as usize, total_size) {
                unsafe { libc::close(fd) };
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "segment {posix_name} is {} bytes, expected {total_size}",
                        st.st_size
                    ),
                ));
            }
        }

        Self::mmap_and_finish(fd, total_size, user_size, posix_name)
    }

    fn mmap_and_finish(
        fd: i32,
        total_size: usize,
        user_size: usize,
        posix_name: String,
    ) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let prev = unsafe { acc_of(mem as *mut u8, total_size).fetch_add(1, Ordering::AcqRel) };

        Ok(Self {
            mem: mem as *mut u8,
            size: total_size,
            user_size,
            name: posix_name,
            prev_ref: prev,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    pub fn mapped_size(&self) -> usize {
        self.size
    }

    pub fn user_size(&self) -> usize {
        self.user_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ref count before this handle's own increment; 0 for the first mapper.
    pub fn prev_ref_count(&self) -> i32 {
        self.prev_ref
    }

    pub fn ref_count(&self) -> i32 {
        if self.mem.is_null() || self.size == 0 {
            return 0;
        }
        unsafe { acc_of(self.mem, self.size).load(Ordering::Acquire) }
    }

    /// Remove the name (shm_unlink). Existing mappings stay valid.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    pub fn unlink_by_name(name: &str) {
        let posix_name = shm_name::make_shm_name(name);
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

// macOS reports shm object sizes rounded up to a whole page.
#[cfg(target_os = "macos")]
fn size_matches(actual: usize, expected: usize) -> bool {
    actual >= expected && actual - expected < page_size()
}

#[cfg(target_os = "macos")]
fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(not(target_os = "macos"))]
fn size_matches(actual: usize, expected: usize) -> bool {
    actual == expected
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Last mapper out removes the name.
        let prev = unsafe { acc_of(self.mem, self.size).fetch_sub(1, Ordering::AcqRel) };
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
        if prev <= 1 {
            self.unlink();
        }
    }
}

// ---------------------------------------------------------------------------
// Process identity and liveness
// ---------------------------------------------------------------------------

/// Pid of the calling process, re-read on every call so forked children
/// see their own id.
pub fn current_pid() -> u32 {
    std::process::id()
}

/// `true` only when `pid` is provably not a running process.
///
/// Zombies still have a process-table entry and therefore count as alive
/// until their parent reaps them.
pub fn proc_dead(pid: u32) -> bool {
    if pid == 0 || pid > libc::pid_t::MAX as u32 {
        return false;
    }
    probe_dead(pid)
}

#[cfg(target_os = "linux")]
fn probe_dead(pid: u32) -> bool {
    match std::fs::metadata(format!("/proc/{pid}")) {
        Ok(_) => false,
        Err(e) => e.kind() == io::ErrorKind::NotFound,
    }
}

#[cfg(not(target_os = "linux"))]
fn probe_dead(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    ret == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calc_size_appends_counter() {
        assert_eq!(calc_size(1), 8);
        assert_eq!(calc_size(4), 8);
        assert_eq!(calc_size(5), 12);
    }

    #[test]
    fn self_is_alive() {
        assert!(!proc_dead(current_pid()));
    }

    #[test]
    fn zero_and_oversized_pids_are_not_dead() {
        assert!(!proc_dead(0));
        assert!(!proc_dead(u32::MAX));
    }
}
