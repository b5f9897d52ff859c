// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Recovery from real process death. A forked child takes the named lock and
// exits (or is killed) without releasing it; the parent reaps the child so
// its /proc entry disappears and then acquires the lock.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use robust_ipc::NamedRobustLock;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_crash_{}_{n}", std::process::id())
}

/// Run `body` in a forked child which then `_exit`s without unwinding or
/// running destructors, like a crash would.
fn fork_child<F: FnOnce()>(body: F) -> libc::pid_t {
    match unsafe { libc::fork() } {
        -1 => panic!("fork failed: {}", io::Error::last_os_error()),
        0 => {
            body();
            unsafe { libc::_exit(0) }
        }
        pid => pid,
    }
}

fn reap(pid: libc::pid_t) {
    let mut status = 0;
    let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(ret, pid, "waitpid: {}", io::Error::last_os_error());
}

fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn exclusive_hold_of_exited_child_is_recovered() {
    let name = unique_name("excl_exit");
    NamedRobustLock::clear_storage(&name);
    let lock = NamedRobustLock::open(&name).expect("open");

    let child = fork_child(|| lock.lock());
    reap(child);

    assert_eq!(lock.exclusive_owner(), Some(child as u32));
    assert!(lock.try_lock(), "dead owner should be recovered");
    assert_eq!(lock.exclusive_owner(), Some(std::process::id()));
    lock.unlock();
    assert_eq!(lock.exclusive_owner(), None);
}

#[test]
fn shared_hold_of_exited_child_is_pruned() {
    let name = unique_name("shared_exit");
    NamedRobustLock::clear_storage(&name);
    let lock = NamedRobustLock::open(&name).expect("open");

    let child = fork_child(|| {
        let _ = lock.lock_sharable();
    });
    reap(child);

    assert_eq!(lock.shared_owners(), vec![child as u32]);
    lock.lock();
    assert!(lock.shared_owners().is_empty());
    assert_eq!(lock.raw_mutex().readers(), 0);
    lock.unlock();
}

#[test]
fn killed_child_is_recovered_only_after_death() {
    let name = unique_name("excl_kill");
    NamedRobustLock::clear_storage(&name);
    let lock = NamedRobustLock::open(&name).expect("open");

    let child = fork_child(|| {
        lock.lock();
        loop {
            unsafe { libc::pause() };
        }
    });

    wait_until(|| lock.exclusive_owner() == Some(child as u32));
    // alive: never reaped, however often we try
    for _ in 0..20 {
        assert!(!lock.try_lock());
        assert!(!lock.try_lock_sharable().expect("try_lock_sharable"));
    }

    unsafe { libc::kill(child, libc::SIGKILL) };
    reap(child);

    let start = Instant::now();
    lock.lock();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(lock.exclusive_owner(), Some(std::process::id()));
    lock.unlock();
}

#[test]
fn data_written_before_crash_is_visible_after_recovery() {
    let name = unique_name("data");
    NamedRobustLock::clear_storage(&name);
    let lock = NamedRobustLock::open_with_data(&name, 64).expect("open");

    let child = fork_child(|| {
        let mut access = lock.write_access();
        let _ = access.write(b"written by child");
        std::mem::forget(access);
    });
    reap(child);

    let read = lock.read_access().expect("read_access");
    assert_eq!(&read.as_slice()[..16], b"written by child");
    assert_eq!(lock.exclusive_owner(), None);
}

#[test]
fn many_dead_readers_unblock_a_writer() {
    let name = unique_name("many_readers");
    NamedRobustLock::clear_storage(&name);
    let lock = NamedRobustLock::open(&name).expect("open");

    let children: Vec<_> = (0..4)
        .map(|_| {
            fork_child(|| {
                let _ = lock.lock_sharable();
            })
        })
        .collect();
    for &child in &children {
        reap(child);
    }

    assert_eq!(lock.raw_mutex().readers(), 4);
    assert_eq!(lock.prune_readers(), 4);
    assert!(lock.try_lock());
    lock.unlock();
}
