// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The access decision engine.
//!
//! A [`FailedAccessCounter`] counts consecutive failures per resource and
//! remote host and denies access once the count exceeds the threshold.
//! Records are never expired on read: they stay until a sweep removes them,
//! which is why a denial reports the sweep-aligned instant it ends.
//!
//! The counter owns its reaper. Call [`FailedAccessCounter::start`] to begin
//! sweeping and [`FailedAccessCounter::stop`] before shutting down.

use crate::config::CounterConfig;
use crate::error::{Error, Result};
use crate::model::{self, AccessResult, FailedAccess, Page, PageRequest, RecordId};
use crate::reaper::{Reaper, StatsSnapshot, SweepGuard, SweepReport, SweepStats};
use crate::store::{FailedAccessStore, InMemoryStore};
use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Thread-safe failed access counter.
pub struct FailedAccessCounter {
    config: CounterConfig,
    store: OnceLock<Arc<dyn FailedAccessStore>>,
    stats: SweepStats,
    sweeping: AtomicBool,
    /// Running reaper; also serializes `start` and `stop`
    reaper: Mutex<Option<Reaper>>,
}

impl FailedAccessCounter {
    /// Create a counter without a store. The in-memory store is bound on
    /// [`start`](Self::start) or on first use.
    pub fn new(config: CounterConfig) -> Self {
        let counter = Self {
            config,
            store: OnceLock::new(),
            stats: SweepStats::default(),
            sweeping: AtomicBool::new(false),
            reaper: Mutex::new(None),
        };
        counter.stats.set_last_sweep_start(model::now());
        counter
    }

    /// Create a counter backed by `store`.
    pub fn with_store(config: CounterConfig, store: Arc<dyn FailedAccessStore>) -> Self {
        let counter = Self::new(config);
        // A fresh OnceLock is always empty
        let _ = counter.store.set(store);
        counter
    }

    /// Replace the store. Only possible before the counter is shared.
    pub fn set_store(&mut self, store: Arc<dyn FailedAccessStore>) {
        self.store = OnceLock::from(store);
    }

    pub fn set_counter_threshold(&mut self, threshold: u32) {
        self.config.counter_threshold = threshold;
    }

    pub fn set_record_ttl(&mut self, ttl: Duration) {
        self.config.record_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn set_reap_interval(&mut self, interval: Duration) {
        self.config.reap_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    }

    fn store(&self) -> &Arc<dyn FailedAccessStore> {
        self.store.get_or_init(|| {
            info!("No store configured, using in-memory store");
            Arc::new(InMemoryStore::new())
        })
    }

    pub fn store_name(&self) -> &str {
        self.store().name()
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    pub fn counter_threshold(&self) -> u32 {
        self.config.counter_threshold
    }

    pub fn record_ttl(&self) -> Duration {
        self.config.record_ttl()
    }

    pub fn reap_interval(&self) -> Duration {
        self.config.reap_interval()
    }

    pub fn last_sweep_start(&self) -> DateTime<Utc> {
        self.stats.last_sweep_start()
    }

    pub fn last_sweep_duration(&self) -> Duration {
        self.stats.last_sweep_duration()
    }

    pub fn last_sweep_removed(&self) -> u64 {
        self.stats.last_sweep_removed()
    }

    pub fn total_removed(&self) -> u64 {
        self.stats.total_removed()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn is_running(&self) -> bool {
        self.reaper.lock().await.is_some()
    }

    /// Start sweeping obsolete records. A no-op with a warning if the
    /// counter is already running.
    pub async fn start(self: &Arc<Self>) {
        let mut reaper = self.reaper.lock().await;
        if reaper.is_some() {
            warn!("Failed access counter is already running");
            return;
        }

        let store = self.store();
        info!(
            store = store.name(),
            counter_threshold = self.config.counter_threshold,
            record_ttl_ms = self.config.record_ttl_ms,
            reap_interval_ms = self.config.reap_interval_ms,
            "Starting failed access counter"
        );
        self.stats.set_last_sweep_start(model::now());
        *reaper = Some(Reaper::spawn(Arc::downgrade(self), self.config.reap_interval()));
        info!("Failed access counter started");
    }

    /// Stop sweeping. Returns once the reaper task has exited; no sweep runs
    /// after that. A no-op with a warning if the counter is not running.
    pub async fn stop(&self) {
        let mut reaper = self.reaper.lock().await;
        match reaper.take() {
            Some(running) => {
                info!("Stopping failed access counter");
                running.shutdown().await;
                info!("Failed access counter stopped");
            }
            None => warn!("Failed access counter is not running"),
        }
    }

    /// Record a failed attempt of `remote_host` against `resource_id`.
    ///
    /// `time` defaults to now. The returned counter is the count after this
    /// failure.
    pub async fn record_failure(
        &self,
        resource_id: &str,
        remote_host: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<AccessResult> {
        let remote_host = require_remote_host(remote_host)?;
        let resource_id = model::normalize_resource_id(resource_id);
        let at = model::time_or_now(time);

        let record = self.store().increment(resource_id, remote_host, at).await?;
        let result = self.decide(Some(&record), at);
        if result.granted {
            debug!(%resource_id, %remote_host, counter = record.counter, "Failed access recorded");
        } else {
            info!(
                %resource_id,
                %remote_host,
                counter = record.counter,
                denied_until = ?result.denied_until,
                "Access denied after failed attempt"
            );
        }
        Ok(result)
    }

    /// Record a successful attempt.
    ///
    /// A success while still granted clears the failure history. A success
    /// while denied changes nothing and is reported as denied. The returned
    /// counter is the count before any reset. If a concurrent failure
    /// changes the record before it is cleared, the record is kept and the
    /// result reflects it.
    pub async fn record_success(
        &self,
        resource_id: &str,
        remote_host: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<AccessResult> {
        let remote_host = require_remote_host(remote_host)?;
        let resource_id = model::normalize_resource_id(resource_id);
        let at = model::time_or_now(time);

        let store = self.store();
        let record = store.get_by_key(resource_id, remote_host).await?;
        let result = self.decide(record.as_ref(), at);
        match &record {
            Some(existing) if result.granted => {
                if !store.remove_if_unchanged(existing).await? {
                    // A concurrent failure got in first; it stands
                    let current = store.get_by_key(resource_id, remote_host).await?;
                    debug!(
                        %resource_id,
                        %remote_host,
                        counter = current.as_ref().map_or(0, |r| r.counter),
                        "Record changed before reset, keeping it"
                    );
                    return Ok(self.decide(current.as_ref(), at));
                }
                debug!(%resource_id, %remote_host, counter = existing.counter, "Failure history reset");
            }
            Some(existing) => {
                info!(%resource_id, %remote_host, counter = existing.counter, "Success while access is denied");
            }
            None => {}
        }
        Ok(result)
    }

    /// Whether `remote_host` may access `resource_id`. Never writes.
    pub async fn check_access(&self, resource_id: &str, remote_host: &str) -> Result<AccessResult> {
        let resource_id = model::normalize_resource_id(resource_id);
        let remote_host = remote_host.trim();
        let record = self.store().get_by_key(resource_id, remote_host).await?;
        let timestamp = record
            .as_ref()
            .map_or_else(model::now, |r| r.modification_time);
        let result = self.decide(record.as_ref(), timestamp);
        debug!(%resource_id, %remote_host, granted = result.granted, counter = result.counter, "Access checked");
        Ok(result)
    }

    /// Delete the record of a key. Returns whether one existed.
    pub async fn remove_record(&self, resource_id: &str, remote_host: &str) -> Result<bool> {
        let remote_host = require_remote_host(remote_host)?;
        let resource_id = model::normalize_resource_id(resource_id);
        let removed = self.store().remove_by_key(resource_id, remote_host).await?;
        if removed {
            self.stats.add_removed();
            debug!(%resource_id, %remote_host, "Record removed");
        }
        Ok(removed)
    }

    /// Remove every record older than the record TTL.
    ///
    /// Returns `Ok(None)` without doing anything if another sweep is in
    /// progress. A failed removal is logged and counted but does not stop
    /// the sweep; a failure to list obsolete records is returned.
    pub async fn remove_obsolete(&self) -> Result<Option<SweepReport>> {
        let Some(_guard) = SweepGuard::try_acquire(&self.sweeping) else {
            debug!("Sweep already in progress");
            return Ok(None);
        };

        let started = model::now();
        let clock = Instant::now();
        self.stats.set_last_sweep_start(started);

        let obsolete = self.store().find_obsolete(self.config.record_ttl()).await?;
        let mut removed = 0u64;
        let mut failed = 0u64;
        for record in &obsolete {
            match self.store().remove_if_unchanged(record).await {
                Ok(true) => {
                    removed += 1;
                    self.stats.add_removed();
                }
                // Reset by a success or refreshed by a new failure since listed
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    warn!(
                        resource_id = %record.resource_id,
                        remote_host = %record.remote_host,
                        error = %e,
                        "Failed to remove obsolete record"
                    );
                }
            }
        }

        let duration = clock.elapsed();
        self.stats.finish_sweep(removed, duration);
        Ok(Some(SweepReport {
            started,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            removed,
            failed,
        }))
    }

    /// The record of a key, if any.
    pub async fn get_entry(
        &self,
        resource_id: &str,
        remote_host: &str,
    ) -> Result<Option<FailedAccess>> {
        let resource_id = model::normalize_resource_id(resource_id);
        Ok(self.store().get_by_key(resource_id, remote_host.trim()).await?)
    }

    pub async fn get_entry_by_id(&self, id: &RecordId) -> Result<Option<FailedAccess>> {
        Ok(self.store().get_by_id(id).await?)
    }

    pub async fn count_entries(&self, query: &str) -> Result<u64> {
        Ok(self.store().count(query).await?)
    }

    /// One page of records matching the request's query.
    pub async fn find_entries(&self, request: &PageRequest) -> Result<Page<FailedAccess>> {
        let store = self.store();
        let total = store.count(&request.query).await?;
        let items = store
            .find(&request.query, request.offset(), request.limit(), &request.sort)
            .await?;
        Ok(Page {
            items,
            total,
            page_number: request.page_number,
            page_size: request.page_size,
        })
    }

    fn is_granted(&self, record: Option<&FailedAccess>) -> bool {
        record.map_or(true, |r| r.counter <= self.config.counter_threshold)
    }

    fn decide(&self, record: Option<&FailedAccess>, timestamp: DateTime<Utc>) -> AccessResult {
        let granted = self.is_granted(record);
        let denied_until = match record {
            Some(r) if !granted => Some(self.denied_until(r.modification_time)),
            _ => None,
        };
        AccessResult {
            granted,
            timestamp,
            counter: record.map_or(0, |r| r.counter),
            counter_threshold: self.config.counter_threshold,
            denied_until,
        }
    }

    /// First scheduled sweep at or after the record's naive expiry.
    fn denied_until(&self, modification_time: DateTime<Utc>) -> DateTime<Utc> {
        let expiry_ms = modification_time
            .timestamp_millis()
            .saturating_add(i64::try_from(self.config.record_ttl_ms).unwrap_or(i64::MAX));
        let aligned = align_to_sweep(
            expiry_ms,
            self.stats.last_sweep_start_ms(),
            self.config.reap_interval_ms,
        );
        DateTime::from_timestamp_millis(aligned).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Drop for FailedAccessCounter {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.cancel();
        }
    }
}

impl std::fmt::Debug for FailedAccessCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedAccessCounter")
            .field("config", &self.config)
            .field("store", &self.store.get().map(|s| s.name()))
            .field("stats", &self.stats)
            .finish()
    }
}

fn require_remote_host(remote_host: &str) -> Result<&str> {
    let trimmed = remote_host.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("remote host must not be blank".to_string()));
    }
    Ok(trimmed)
}

/// Smallest `last_sweep + k * interval` (k >= 1) that is not before
/// `expiry`. Sweeps run every `interval` after `last_sweep`, so that is the
/// first one able to remove a record expiring at `expiry`.
fn align_to_sweep(expiry_ms: i64, last_sweep_ms: i64, interval_ms: u64) -> i64 {
    if interval_ms == 0 {
        return expiry_ms;
    }
    let interval = i128::from(interval_ms);
    let first = i128::from(last_sweep_ms) + interval;
    let expiry = i128::from(expiry_ms);
    let aligned = if first >= expiry {
        first
    } else {
        let steps = (expiry - first + interval - 1) / interval;
        first + steps * interval
    };
    i64::try_from(aligned).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn counter(threshold: u32) -> FailedAccessCounter {
        FailedAccessCounter::new(CounterConfig {
            counter_threshold: threshold,
            record_ttl_ms: 1_000,
            reap_interval_ms: 2_000,
        })
    }

    #[test]
    fn test_align_to_sweep() {
        // First sweep after the last one already covers the expiry
        assert_eq!(align_to_sweep(500, 0, 2_000), 2_000);
        // Exactly on a sweep
        assert_eq!(align_to_sweep(4_000, 0, 2_000), 4_000);
        // Between sweeps rounds up
        assert_eq!(align_to_sweep(4_001, 0, 2_000), 6_000);
        assert_eq!(align_to_sweep(10_500, 1_000, 3_000), 13_000);
        // No interval means no quantization
        assert_eq!(align_to_sweep(4_001, 0, 0), 4_001);
        assert_eq!(align_to_sweep(i64::MAX, 0, 7), i64::MAX);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let counter = counter(3);
        let mut granted = Vec::new();
        for _ in 0..5 {
            let result = counter.record_failure("login", "10.0.0.1", None).await.unwrap();
            granted.push(result.granted);
        }
        assert_eq!(granted, vec![true, true, true, false, false]);
    }

    #[tokio::test]
    async fn test_denied_until_is_sweep_aligned() {
        let counter = counter(0);
        let result = counter.record_failure("login", "10.0.0.1", None).await.unwrap();
        assert!(!result.granted);

        let denied_until = result.denied_until.expect("denied result carries denied_until");
        let record = counter.get_entry("login", "10.0.0.1").await.unwrap().unwrap();
        assert!(denied_until >= record.modification_time + TimeDelta::milliseconds(1_000));

        let since_sweep = (denied_until - counter.last_sweep_start()).num_milliseconds();
        assert!(since_sweep > 0);
        assert_eq!(since_sweep % 2_000, 0);
    }

    #[tokio::test]
    async fn test_blank_remote_host_rejected() {
        let counter = counter(3);
        let err = counter.record_failure("login", "  ", None).await.unwrap_err();
        assert!(err.is_validation());
        assert!(counter.record_success("login", "", None).await.unwrap_err().is_validation());
        assert!(counter.remove_record("login", "").await.unwrap_err().is_validation());
        assert_eq!(counter.find_entries(&PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_blank_resource_uses_sentinel() {
        let counter = counter(3);
        counter.record_failure("", "10.0.0.1", None).await.unwrap();
        let record = counter
            .get_entry(model::UNKNOWN_RESOURCE, "10.0.0.1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.counter, 1);
    }

    #[tokio::test]
    async fn test_explicit_time_is_used() {
        let counter = counter(3);
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let result = counter.record_failure("login", "10.0.0.1", Some(at)).await.unwrap();
        assert_eq!(result.timestamp, at);

        let check = counter.check_access("login", "10.0.0.1").await.unwrap();
        assert_eq!(check.timestamp, at);
    }

    #[tokio::test]
    async fn test_sweep_skipped_while_in_progress() {
        let counter = counter(3);
        let _held = SweepGuard::try_acquire(&counter.sweeping).unwrap();
        assert!(counter.remove_obsolete().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setters_before_start() {
        let mut counter = counter(3);
        counter.set_counter_threshold(5);
        counter.set_record_ttl(Duration::from_secs(60));
        counter.set_reap_interval(Duration::from_secs(5));
        assert_eq!(counter.counter_threshold(), 5);
        assert_eq!(counter.record_ttl(), Duration::from_secs(60));
        assert_eq!(counter.reap_interval(), Duration::from_secs(5));
        assert_eq!(counter.store_name(), "in-memory");
    }
}
