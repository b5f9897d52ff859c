// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use thiserror::Error;

/// Failures surfaced by lock operations beyond plain contention.
#[derive(Error, Debug)]
pub enum LockError {
    /// Every shared-owner slot is held by a live process.
    #[error("shared-owner registry is full ({capacity} live holders)")]
    RegistryFull {
        /// Slots in the registry.
        capacity: usize,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type LockResult<T> = Result<T, LockError>;
