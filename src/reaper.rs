// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Periodic removal of obsolete records.
//!
//! The reaper is one background task that calls
//! [`FailedAccessCounter::remove_obsolete`] and then waits one reap interval.
//! The wait races a cancellation token, so stopping the counter wakes the
//! task at once instead of letting it sleep out the interval.

use crate::counter::FailedAccessCounter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest wait between two sweeps.
const MIN_REAP_INTERVAL: Duration = Duration::from_millis(1);

/// Statistics of the sweeps performed by one counter.
///
/// Written by sweeps and removals, read by anyone without locking.
#[derive(Debug, Default)]
pub struct SweepStats {
    last_sweep_start_ms: AtomicI64,
    last_sweep_duration_ms: AtomicU64,
    last_sweep_removed: AtomicU64,
    total_removed: AtomicU64,
}

impl SweepStats {
    pub fn last_sweep_start(&self) -> DateTime<Utc> {
        let ms = self.last_sweep_start_ms();
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub(crate) fn last_sweep_start_ms(&self) -> i64 {
        self.last_sweep_start_ms.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_sweep_start(&self, at: DateTime<Utc>) {
        self.last_sweep_start_ms
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn last_sweep_duration(&self) -> Duration {
        Duration::from_millis(self.last_sweep_duration_ms.load(Ordering::SeqCst))
    }

    pub fn last_sweep_removed(&self) -> u64 {
        self.last_sweep_removed.load(Ordering::SeqCst)
    }

    pub fn total_removed(&self) -> u64 {
        self.total_removed.load(Ordering::SeqCst)
    }

    pub(crate) fn add_removed(&self) {
        self.total_removed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn finish_sweep(&self, removed: u64, duration: Duration) {
        self.last_sweep_removed.store(removed, Ordering::SeqCst);
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.last_sweep_duration_ms.store(ms, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            last_sweep_start: self.last_sweep_start(),
            last_sweep_duration_ms: self.last_sweep_duration_ms.load(Ordering::SeqCst),
            last_sweep_removed: self.last_sweep_removed(),
            total_removed: self.total_removed(),
        }
    }
}

/// Point-in-time copy of [`SweepStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub last_sweep_start: DateTime<Utc>,
    pub last_sweep_duration_ms: u64,
    pub last_sweep_removed: u64,
    pub total_removed: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub started: DateTime<Utc>,
    pub duration_ms: u64,
    /// Records removed by this sweep
    pub removed: u64,
    /// Records whose removal failed; they are retried by the next sweep
    pub failed: u64,
}

/// Held while a sweep runs. Dropping it clears the in-progress flag on every
/// exit path, including errors and cancelled futures.
pub(crate) struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SweepGuard<'a> {
    /// `None` if another sweep holds the flag.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handle of a running reaper task.
#[derive(Debug)]
pub(crate) struct Reaper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reaper {
    /// Spawn the reaper loop on the current tokio runtime.
    ///
    /// The task only holds a weak reference, so dropping the last handle to
    /// the counter ends the loop.
    pub(crate) fn spawn(counter: Weak<FailedAccessCounter>, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(counter, interval.max(MIN_REAP_INTERVAL), token.clone()));
        Self { token, handle }
    }

    /// Cancel the loop and wait for the task to exit. A sweep that is already
    /// running finishes first; no sweep starts afterwards.
    pub(crate) async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Reaper task ended abnormally");
        }
    }

    /// Cancel without waiting.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

async fn run(counter: Weak<FailedAccessCounter>, interval: Duration, token: CancellationToken) {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    debug!(interval_ms, "Reaper started");
    while !token.is_cancelled() {
        let Some(counter) = counter.upgrade() else {
            break;
        };
        match counter.remove_obsolete().await {
            Ok(Some(report)) if report.removed > 0 || report.failed > 0 => info!(
                removed = report.removed,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "Removed obsolete records"
            ),
            Ok(Some(report)) => debug!(duration_ms = report.duration_ms, "No obsolete records"),
            Ok(None) => debug!("Sweep already in progress, skipped"),
            Err(e) => warn!(error = %e, "Sweep failed"),
        }
        drop(counter);

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Reaper stopped");
}
