// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Crash-tolerant reader/writer lock for memory shared between processes.
// Exclusive and shared holders are tracked by pid; a holder that dies while
// holding the lock is detected through the OS process table and its hold is
// released by the next blocked acquirer.

pub mod shm_name;

mod platform;

mod error;
pub use error::{LockError, LockResult};

mod rw_lock;
pub use rw_lock::SharedRwMutex;

mod lockless_set;
pub use lockless_set::{LocklessSet, DEFAULT_SHARED_OWNERS};

pub mod liveness;
pub use liveness::{Liveness, ProcessTable};

mod robust_lock;
pub use robust_lock::{LockContext, RobustLock, DEFAULT_POLL_INTERVAL};

mod scoped_access;
pub use scoped_access::{ExclusiveAccess, ScopedRead, ScopedWrite, SharedAccess};

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod named_lock;
pub use named_lock::NamedRobustLock;
