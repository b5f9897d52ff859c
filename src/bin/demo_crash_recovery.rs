// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_crash_recovery [exclusive|shared]
//
// Spawns a copy of itself that takes the named lock "robust-demo" in the
// given mode, writes a message into the guarded region and aborts without
// releasing anything. The parent then takes the lock exclusively, reads the
// message back and reports how long recovery took.
//
// Set RUST_LOG=debug to see the recovery events.

use std::process::{Command, ExitCode};
use std::time::Instant;

use robust_ipc::NamedRobustLock;
use tracing_subscriber::EnvFilter;

const LOCK_NAME: &str = "robust-demo";
const DATA_SIZE: usize = 64;
const CHILD_FLAG: &str = "--child";

fn run_child(mode: &str) -> ! {
    let lock = match NamedRobustLock::open_with_data(LOCK_NAME, DATA_SIZE) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("child: open failed: {e}");
            std::process::exit(1);
        }
    };
    let msg = format!("left by pid {}", std::process::id());
    {
        let mut w = lock.write_access();
        if let Err(e) = w.write(msg.as_bytes()) {
            eprintln!("child: write failed: {e}");
        }
    }
    if mode == "shared" {
        if let Err(e) = lock.lock_sharable() {
            eprintln!("child: lock_sharable failed: {e}");
        }
    } else {
        lock.lock();
    }
    println!("child {}: holding {mode} lock, aborting", std::process::id());
    std::process::abort();
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some(CHILD_FLAG) {
        run_child(args.get(2).map(String::as_str).unwrap_or("exclusive"));
    }

    let mode = args.get(1).cloned().unwrap_or_else(|| "exclusive".to_string());
    if mode != "exclusive" && mode != "shared" {
        eprintln!("usage: demo_crash_recovery [exclusive|shared]");
        return ExitCode::FAILURE;
    }

    NamedRobustLock::clear_storage(LOCK_NAME);
    let lock = match NamedRobustLock::open_with_data(LOCK_NAME, DATA_SIZE) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("open failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("current_exe failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    // status() waits for the child, which also reaps it.
    match Command::new(exe).args([CHILD_FLAG, mode.as_str()]).status() {
        Ok(status) => println!("parent: child exited with {status}"),
        Err(e) => {
            eprintln!("spawn failed: {e}");
            return ExitCode::FAILURE;
        }
    }
    println!("parent: lock state {:?}", lock.as_lock());

    let start = Instant::now();
    let w = lock.write_access();
    let elapsed = start.elapsed();
    let text = String::from_utf8_lossy(w.as_slice());
    println!(
        "parent: recovered in {elapsed:?}, data = {:?}",
        text.trim_end_matches('\0')
    );
    drop(w);

    NamedRobustLock::clear_storage(LOCK_NAME);
    ExitCode::SUCCESS
}
