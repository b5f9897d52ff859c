// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

#[cfg(unix)]
pub use posix::{current_pid, proc_dead, PlatformShm, ShmMode};

#[cfg(not(unix))]
compile_error!("robust_ipc requires a POSIX platform");
