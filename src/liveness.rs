// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process liveness oracle consulted before recovering a lock on behalf of
// a holder.

pub use crate::platform::{current_pid, proc_dead};

/// Answers "is this process provably gone?".
///
/// Implementations must return `true` only when `pid` cannot be running:
/// reporting a live process as dead lets a recoverer free a lock that is
/// still held. Reporting a dead process as alive only delays recovery.
/// `0` is never dead.
pub trait Liveness {
    fn is_dead(&self, pid: u32) -> bool;
}

/// The operating system's process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTable;

impl Liveness for ProcessTable {
    fn is_dead(&self, pid: u32) -> bool {
        proc_dead(pid)
    }
}

impl<L: Liveness + ?Sized> Liveness for &L {
    fn is_dead(&self, pid: u32) -> bool {
        (**self).is_dead(pid)
    }
}
