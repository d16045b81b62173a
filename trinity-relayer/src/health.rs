//! Periodic health reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use trinity_core::{OperationRegistry, RelayerStats, StatsRecorder};

/// Logs uptime and counters on a fixed interval.
pub struct HealthMonitor {
    stats: Arc<StatsRecorder>,
    registry: Arc<OperationRegistry>,
    interval: Duration,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        stats: Arc<StatsRecorder>,
        registry: Arc<OperationRegistry>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stats,
            registry,
            interval,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }

        debug!("Health monitor stopped");
    }

    /// Emit one health report and return the snapshot it was built from.
    pub fn report(&self) -> RelayerStats {
        let stats = self.stats.snapshot();
        let pending = self.registry.pending_operations().len();

        info!(
            uptime = %format_uptime(Duration::from_secs(stats.uptime_secs)),
            operations = stats.operations_processed,
            proofs = stats.proofs_submitted,
            consensus = stats.consensus_achieved,
            failed = stats.failed_submissions,
            pending,
            "Relayer health"
        );
        stats
    }
}

/// `"{h}h {m}m"`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}
