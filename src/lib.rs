// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Failed Access Counter
//!
//! Brute-force mitigation for authentication endpoints and other guarded
//! resources:
//!
//! - Consecutive failures counted per resource and remote host
//! - Access denied once the count exceeds a threshold
//! - A success below the threshold clears the history
//! - Records removed by a periodic sweep once they are older than their TTL
//! - Pluggable record stores behind an async trait

pub mod config;
pub mod counter;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod model;
pub mod reaper;
pub mod store;

pub use config::{Config, CounterConfig};
pub use counter::FailedAccessCounter;
pub use error::{Error, Result};
pub use model::{AccessResult, FailedAccess, Page, PageRequest, RecordId, SortField, SortOrder};
pub use reaper::{StatsSnapshot, SweepReport};
pub use store::{FailedAccessStore, InMemoryStore, StoreError, StoreResult};
