// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the failed access counter service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the failed access counter service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Counter policy
    #[serde(default)]
    pub counter: CounterConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Policy of the failed access counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Failures tolerated before access is denied (default: 10)
    #[serde(default = "default_counter_threshold")]
    pub counter_threshold: u32,

    /// Age in milliseconds after which a record is obsolete (default: 23h)
    #[serde(default = "default_record_ttl_ms")]
    pub record_ttl_ms: u64,

    /// Milliseconds between two sweeps of obsolete records (default: 1h)
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_counter_threshold() -> u32 {
    10
}

fn default_record_ttl_ms() -> u64 {
    23 * 60 * 60 * 1000
}

fn default_reap_interval_ms() -> u64 {
    60 * 60 * 1000
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            counter: CounterConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            counter_threshold: default_counter_threshold(),
            record_ttl_ms: default_record_ttl_ms(),
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl CounterConfig {
    /// Get the record time-to-live
    pub fn record_ttl(&self) -> Duration {
        Duration::from_millis(self.record_ttl_ms)
    }

    /// Get the interval between sweeps
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
    /// - `COUNTER_THRESHOLD`: Failures tolerated per resource and host (default: 10)
    /// - `RECORD_TTL_MS`: Record lifetime in milliseconds (default: 23h)
    /// - `REAP_INTERVAL_MS`: Sweep interval in milliseconds (default: 1h)
    /// - `METRICS_ENABLED`: Serve Prometheus metrics (default: true)
    ///
    /// Absent or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(default_bind_addr),
            counter: CounterConfig {
                counter_threshold: parsed(lookup("COUNTER_THRESHOLD"))
                    .unwrap_or_else(default_counter_threshold),
                record_ttl_ms: parsed(lookup("RECORD_TTL_MS")).unwrap_or_else(default_record_ttl_ms),
                reap_interval_ms: parsed(lookup("REAP_INTERVAL_MS"))
                    .unwrap_or_else(default_reap_interval_ms),
            },
            metrics: MetricsConfig {
                enabled: parsed(lookup("METRICS_ENABLED")).unwrap_or_else(default_true),
                ..Default::default()
            },
        }
    }
}
