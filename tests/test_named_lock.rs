// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named robust locks and the shared memory segments behind them.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use robust_ipc::{NamedRobustLock, ShmHandle, ShmOpenMode};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_named_{}_{n}", std::process::id())
}

// ========== Segments ==========

#[test]
fn acquire_create_and_reopen() {
    let name = unique_name("shm_create");
    ShmHandle::unlink_by_name(&name);

    let shm = ShmHandle::acquire(&name, 1024, ShmOpenMode::Create).expect("create");
    assert!(shm.is_creator());
    assert!(shm.mapped_size() >= 1024);
    assert_eq!(shm.user_size(), 1024);
    assert!(shm.name().starts_with('/'));

    let again = ShmHandle::acquire(&name, 1024, ShmOpenMode::Open).expect("open");
    assert!(!again.is_creator());
    assert_eq!(shm.ref_count(), 2);

    drop(again);
    assert_eq!(shm.ref_count(), 1);
}

#[test]
fn acquire_create_twice_fails() {
    let name = unique_name("shm_excl");
    ShmHandle::unlink_by_name(&name);

    let _shm = ShmHandle::acquire(&name, 64, ShmOpenMode::Create).expect("create");
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Create).is_err());
}

#[test]
fn acquire_open_nonexistent_fails() {
    let name = unique_name("shm_missing");
    ShmHandle::unlink_by_name(&name);
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Open).is_err());
}

#[test]
fn acquire_rejects_bad_arguments() {
    let err = ShmHandle::acquire("", 64, ShmOpenMode::CreateOrOpen).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

    let err = ShmHandle::acquire(&unique_name("zero"), 0, ShmOpenMode::CreateOrOpen).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn size_mismatch_is_rejected() {
    let name = unique_name("shm_size");
    ShmHandle::unlink_by_name(&name);

    let _shm = ShmHandle::acquire(&name, 128, ShmOpenMode::Create).expect("create");
    let err = ShmHandle::acquire(&name, 4096, ShmOpenMode::Open).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn new_segment_is_zero_filled() {
    let name = unique_name("shm_zero");
    ShmHandle::unlink_by_name(&name);

    let shm = ShmHandle::acquire(&name, 512, ShmOpenMode::Create).expect("create");
    let bytes = unsafe { std::slice::from_raw_parts(shm.as_ptr(), shm.user_size()) };
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn last_handle_unlinks() {
    let name = unique_name("shm_unlink");
    ShmHandle::unlink_by_name(&name);

    {
        let _shm = ShmHandle::acquire(&name, 64, ShmOpenMode::Create).expect("create");
    }
    assert!(ShmHandle::acquire(&name, 64, ShmOpenMode::Open).is_err());
}

// ========== Named locks ==========

#[test]
fn handles_share_one_lock() {
    let name = unique_name("share");
    NamedRobustLock::clear_storage(&name);

    let a = NamedRobustLock::open(&name).expect("open a");
    let b = NamedRobustLock::open(&name).expect("open b");
    assert!(a.is_creator());
    assert!(!b.is_creator());

    a.lock();
    assert_eq!(b.exclusive_owner(), Some(std::process::id()));
    assert!(b.raw_mutex().is_locked_exclusive());
    b.unlock();
    assert_eq!(a.exclusive_owner(), None);
}

#[test]
fn clear_storage_starts_fresh() {
    let name = unique_name("clear");
    NamedRobustLock::clear_storage(&name);

    let a = NamedRobustLock::open(&name).expect("open");
    a.lock();
    NamedRobustLock::clear_storage(&name);

    let b = NamedRobustLock::open(&name).expect("reopen after clear");
    assert!(b.is_creator());
    assert_eq!(b.exclusive_owner(), None);
    a.unlock();
}

#[test]
fn data_region_round_trip() {
    let name = unique_name("data");
    NamedRobustLock::clear_storage(&name);

    let lock = NamedRobustLock::open_with_data(&name, 32).expect("open");
    assert_eq!(lock.data_size(), 32);

    {
        let mut w = lock.write_access();
        assert_eq!(w.len(), 32);
        assert!(w.as_slice().iter().all(|&b| b == 0));
        w.write(b"robust").expect("write");
        let err = w.write(&[0u8; 33]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(lock.try_write_access().is_none());
    }

    let other = NamedRobustLock::open_with_data(&name, 32).expect("open other");
    let r = other.read_access().expect("read_access");
    assert_eq!(&r.as_slice()[..6], b"robust");
    assert!(other.try_write_access().is_none());
}

#[test]
fn mismatched_data_size_is_rejected() {
    let name = unique_name("data_size");
    NamedRobustLock::clear_storage(&name);

    let _a = NamedRobustLock::open_with_data(&name, 16).expect("open");
    let err = NamedRobustLock::open_with_data(&name, 4096).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn threads_serialise_through_named_lock() {
    let name = unique_name("threads");
    NamedRobustLock::clear_storage(&name);

    let lock = Arc::new(
        NamedRobustLock::open_with_data(&name, std::mem::size_of::<u64>()).expect("open"),
    );
    let iterations = 200u64;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                for _ in 0..iterations {
                    let mut w = lock.write_access();
                    let slot = w.as_mut_slice();
                    let v = u64::from_ne_bytes(slot[..8].try_into().unwrap());
                    slot[..8].copy_from_slice(&(v + 1).to_ne_bytes());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let r = lock.read_access().expect("read_access");
    let total = u64::from_ne_bytes(r.as_slice()[..8].try_into().unwrap());
    assert_eq!(total, iterations * 4);
}
