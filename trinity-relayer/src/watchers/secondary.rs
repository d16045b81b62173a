//! Polling watcher for Solana and TON.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::WatcherContext;
use crate::chains::ChainReader;

/// Proves pending operations against one secondary chain on a fixed interval.
pub struct SecondaryWatcher {
    ctx: WatcherContext,
    reader: Arc<dyn ChainReader>,
    poll_interval: Duration,
}

impl SecondaryWatcher {
    pub fn new(ctx: WatcherContext, reader: Arc<dyn ChainReader>, poll_interval: Duration) -> Self {
        Self {
            ctx,
            reader,
            poll_interval,
        }
    }

    pub async fn run(self) {
        let chain = self.reader.role();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; wait a full period like a timer would.
        ticker.tick().await;

        info!(chain = %chain, interval_ms = self.poll_interval.as_millis() as u64, "Monitoring chain");

        loop {
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        debug!(chain = %chain, "Watcher stopped");
    }

    /// One tick: read the chain once, then queue a proof for every operation
    /// still missing this chain's proof. Returns how many were queued.
    pub async fn poll_once(&self) -> usize {
        let chain = self.reader.role();
        let candidates = self.ctx.registry.awaiting_proof(chain);
        if candidates.is_empty() {
            return 0;
        }

        let reference = match self.reader.latest_reference().await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(chain = %chain, error = %e, "Chain read failed, retrying next tick");
                return 0;
            }
        };

        let mut queued = 0;
        for operation in candidates {
            if self.ctx.cancel.is_cancelled() {
                break;
            }
            let Some(guard) = self.ctx.registry.try_claim(operation.id, chain) else {
                debug!(operation_id = %operation.id, chain = %chain, "Submission already in flight");
                continue;
            };

            let ctx = self.ctx.clone();
            let reference = reference.clone();
            self.ctx.tracker.spawn(async move {
                ctx.prove_and_submit(guard, reference).await;
            });
            queued += 1;
        }

        debug!(chain = %chain, block_number = reference.number, queued, "Watcher tick");
        queued
    }
}
