// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the failed access counter service.
//!
//! Decisions are counted as they are served. Sweep statistics and the number
//! of live records are copied from the counter when metrics are scraped.

use crate::counter::FailedAccessCounter;
use crate::model::AccessResult;
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Metrics registry and collectors of one service instance.
pub struct Metrics {
    pub registry: Registry,
    /// Decisions grouped by operation and outcome
    pub decisions: IntCounterVec,
    pub records: IntGauge,
    pub removed_records: IntGauge,
    pub last_sweep_removed: IntGauge,
    pub last_sweep_duration_seconds: Gauge,
    pub last_sweep_timestamp_seconds: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new(
                "failed_access_decisions_total",
                "Access decisions grouped by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(decisions.clone()))?;

        let records = IntGauge::new("failed_access_records", "Records currently stored")?;
        registry.register(Box::new(records.clone()))?;

        let removed_records = IntGauge::new(
            "failed_access_removed_records",
            "Records removed by sweeps and explicit removals since start",
        )?;
        registry.register(Box::new(removed_records.clone()))?;

        let last_sweep_removed = IntGauge::new(
            "failed_access_last_sweep_removed",
            "Records removed by the most recent sweep",
        )?;
        registry.register(Box::new(last_sweep_removed.clone()))?;

        let last_sweep_duration_seconds = Gauge::new(
            "failed_access_last_sweep_duration_seconds",
            "Duration of the most recent sweep",
        )?;
        registry.register(Box::new(last_sweep_duration_seconds.clone()))?;

        let last_sweep_timestamp_seconds = IntGauge::new(
            "failed_access_last_sweep_timestamp_seconds",
            "Start of the most recent sweep as a unix timestamp",
        )?;
        registry.register(Box::new(last_sweep_timestamp_seconds.clone()))?;

        Ok(Self {
            registry,
            decisions,
            records,
            removed_records,
            last_sweep_removed,
            last_sweep_duration_seconds,
            last_sweep_timestamp_seconds,
        })
    }

    pub fn record_decision(&self, operation: &str, result: &AccessResult) {
        let outcome = if result.granted { "granted" } else { "denied" };
        self.decisions.with_label_values(&[operation, outcome]).inc();
    }

    /// Copy the counter's sweep statistics into the gauges.
    pub fn observe_counter(&self, counter: &FailedAccessCounter, records: u64) {
        let stats = counter.stats();
        self.records.set(saturating_i64(records));
        self.removed_records.set(saturating_i64(stats.total_removed));
        self.last_sweep_removed.set(saturating_i64(stats.last_sweep_removed));
        self.last_sweep_duration_seconds
            .set(stats.last_sweep_duration_ms as f64 / 1000.0);
        self.last_sweep_timestamp_seconds
            .set(stats.last_sweep_start.timestamp());
    }

    pub fn render(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
