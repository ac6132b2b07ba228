// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Storage contract for failed access records.
//!
//! Every backend implements [`FailedAccessStore`] on its own; the counter
//! only talks to the trait. Backends differ in persistence mechanics, not in
//! behaviour, so the contract below is the whole story:
//!
//! - at most one record exists per (resource id, remote host);
//! - [`FailedAccessStore::increment`] is atomic per key, so concurrent
//!   failures from one caller never lose an update;
//! - [`FailedAccessStore::remove_if_unchanged`] checks and removes under
//!   one lock, so a sweep or a reset never deletes a record that changed
//!   after it was read;
//! - calls for different keys may run concurrently;
//! - I/O timeouts and retries belong to the backend.

mod memory;

pub use memory::InMemoryStore;

use crate::model::{FailedAccess, RecordId, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store consistency failure: {0}")]
    Conflict(String),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backing store of failed access records.
#[async_trait]
pub trait FailedAccessStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Upsert by (resource id, remote host). Assigns an id on first insert
    /// and returns the persisted record.
    async fn save(&self, record: FailedAccess) -> StoreResult<FailedAccess>;

    /// Record one more failure for the key at `at`, creating the record with
    /// a counter of 1 if it does not exist. Must be atomic per key.
    async fn increment(
        &self,
        resource_id: &str,
        remote_host: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<FailedAccess>;

    async fn get_by_id(&self, id: &RecordId) -> StoreResult<Option<FailedAccess>>;

    async fn get_by_key(
        &self,
        resource_id: &str,
        remote_host: &str,
    ) -> StoreResult<Option<FailedAccess>>;

    async fn remove_by_id(&self, id: &RecordId) -> StoreResult<bool>;

    async fn remove_by_key(&self, resource_id: &str, remote_host: &str) -> StoreResult<bool>;

    /// Remove the record of `expected`'s key only if its counter and
    /// modification time still equal `expected`'s. The check and the removal
    /// must be atomic, so a failure recorded after `expected` was read is
    /// never erased.
    async fn remove_if_unchanged(&self, expected: &FailedAccess) -> StoreResult<bool>;

    /// Number of records matching `search` (see [`FailedAccess::matches`]).
    async fn count(&self, search: &str) -> StoreResult<u64>;

    /// Matching records ordered by `sort`, skipping `offset` and returning at
    /// most `limit` (`None` or 0 for all).
    async fn find(
        &self,
        search: &str,
        offset: usize,
        limit: Option<usize>,
        sort: &[SortOrder],
    ) -> StoreResult<Vec<FailedAccess>>;

    /// Records last modified more than `ttl` ago.
    async fn find_obsolete(&self, ttl: Duration) -> StoreResult<Vec<FailedAccess>>;
}
