//! Relayer counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Snapshot of the relayer counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStats {
    pub operations_processed: u64,
    pub proofs_submitted: u64,
    pub consensus_achieved: u64,
    pub failed_submissions: u64,
    /// Mean submit-to-confirmation latency over confirmed submissions.
    pub average_latency_ms: u64,
    pub uptime_secs: u64,
}

/// Lock-free counters shared by the watchers and the health monitor.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    operations_processed: AtomicU64,
    proofs_submitted: AtomicU64,
    consensus_achieved: AtomicU64,
    failed_submissions: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the uptime clock. Restarting resets it.
    pub fn mark_started(&self) {
        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = Some(Instant::now());
        }
    }

    pub fn record_operation(&self) {
        self.operations_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A confirmed submission and how long confirmation took.
    pub fn record_submission(&self, latency: Duration) {
        self.proofs_submitted.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_total_ms.fetch_add(millis, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consensus(&self) {
        self.consensus_achieved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .ok()
            .and_then(|started_at| started_at.map(|at| at.elapsed()))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> RelayerStats {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let average_latency_ms = match samples {
            0 => 0,
            n => self.latency_total_ms.load(Ordering::Relaxed) / n,
        };

        RelayerStats {
            operations_processed: self.operations_processed.load(Ordering::Relaxed),
            proofs_submitted: self.proofs_submitted.load(Ordering::Relaxed),
            consensus_achieved: self.consensus_achieved.load(Ordering::Relaxed),
            failed_submissions: self.failed_submissions.load(Ordering::Relaxed),
            average_latency_ms,
            uptime_secs: self.uptime().as_secs(),
        }
    }
}
