// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Volatile store used when no backend is configured.

use super::{FailedAccessStore, StoreResult};
use crate::model::{self, compare_records, search_terms, FailedAccess, RecordId, SortOrder};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

type Key = (String, String);

fn key(resource_id: &str, remote_host: &str) -> Key {
    (
        model::normalize_resource_id(resource_id).to_string(),
        remote_host.trim().to_string(),
    )
}

#[derive(Debug, Default)]
struct Records {
    by_key: HashMap<Key, FailedAccess>,
    keys_by_id: HashMap<RecordId, Key>,
    next_id: u64,
}

impl Records {
    fn upsert(&mut self, mut record: FailedAccess) -> FailedAccess {
        let k = key(&record.resource_id, &record.remote_host);
        record.resource_id = k.0.clone();
        record.remote_host = k.1.clone();
        match self.by_key.get(&k) {
            Some(existing) => {
                record.id = existing.id.clone();
                record.creation_time = existing.creation_time;
            }
            None => {
                self.next_id += 1;
                let id = RecordId::new(self.next_id.to_string());
                self.keys_by_id.insert(id.clone(), k.clone());
                record.id = Some(id);
            }
        }
        record.modification_time = record.modification_time.max(record.creation_time);
        self.by_key.insert(k, record.clone());
        record
    }

    fn remove(&mut self, k: &Key) -> bool {
        match self.by_key.remove(k) {
            Some(record) => {
                if let Some(id) = record.id {
                    self.keys_by_id.remove(&id);
                }
                true
            }
            None => false,
        }
    }
}

/// Thread-safe in-memory store.
///
/// All mutations happen under one write lock, which makes `increment`
/// atomic per key.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Records>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn matching(&self, search: &str) -> Vec<FailedAccess> {
        let terms = search_terms(search);
        let records = self.records.read().await;
        records
            .by_key
            .values()
            .filter(|r| r.matches(&terms))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FailedAccessStore for InMemoryStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn save(&self, record: FailedAccess) -> StoreResult<FailedAccess> {
        let saved = self.records.write().await.upsert(record);
        debug!(id = ?saved.id, resource_id = %saved.resource_id, remote_host = %saved.remote_host, counter = saved.counter, "Saved record");
        Ok(saved)
    }

    async fn increment(
        &self,
        resource_id: &str,
        remote_host: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<FailedAccess> {
        let mut records = self.records.write().await;
        let next = match records.by_key.get(&key(resource_id, remote_host)) {
            Some(existing) => existing.next_failure(at),
            None => FailedAccess::first_failure(resource_id, remote_host, at),
        };
        Ok(records.upsert(next))
    }

    async fn get_by_id(&self, id: &RecordId) -> StoreResult<Option<FailedAccess>> {
        let records = self.records.read().await;
        Ok(records
            .keys_by_id
            .get(id)
            .and_then(|k| records.by_key.get(k))
            .cloned())
    }

    async fn get_by_key(
        &self,
        resource_id: &str,
        remote_host: &str,
    ) -> StoreResult<Option<FailedAccess>> {
        let records = self.records.read().await;
        Ok(records.by_key.get(&key(resource_id, remote_host)).cloned())
    }

    async fn remove_by_id(&self, id: &RecordId) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        match records.keys_by_id.get(id).cloned() {
            Some(k) => Ok(records.remove(&k)),
            None => Ok(false),
        }
    }

    async fn remove_by_key(&self, resource_id: &str, remote_host: &str) -> StoreResult<bool> {
        Ok(self
            .records
            .write()
            .await
            .remove(&key(resource_id, remote_host)))
    }

    async fn remove_if_unchanged(&self, expected: &FailedAccess) -> StoreResult<bool> {
        let k = key(&expected.resource_id, &expected.remote_host);
        let mut records = self.records.write().await;
        let unchanged = records.by_key.get(&k).is_some_and(|current| {
            current.counter == expected.counter
                && current.modification_time == expected.modification_time
        });
        Ok(unchanged && records.remove(&k))
    }

    async fn count(&self, search: &str) -> StoreResult<u64> {
        Ok(self.matching(search).await.len() as u64)
    }

    async fn find(
        &self,
        search: &str,
        offset: usize,
        limit: Option<usize>,
        sort: &[SortOrder],
    ) -> StoreResult<Vec<FailedAccess>> {
        let mut records = self.matching(search).await;
        records.sort_by(|a, b| compare_records(a, b, sort));
        let limit = limit.filter(|l| *l > 0).unwrap_or(usize::MAX);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_obsolete(&self, ttl: Duration) -> StoreResult<Vec<FailedAccess>> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let Some(cutoff) = model::now().checked_sub_signed(ttl) else {
            return Ok(Vec::new());
        };
        let records = self.records.read().await;
        Ok(records
            .by_key
            .values()
            .filter(|r| r.modification_time < cutoff)
            .cloned()
            .collect())
    }
}
