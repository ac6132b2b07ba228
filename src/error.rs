// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the failed access counter.

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by counter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required key field was missing or blank. Nothing was written.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The record store failed; the operation was not retried.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
