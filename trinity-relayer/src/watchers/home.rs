//! Arbitrum watcher.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use trinity_core::{ChainRole, Operation};

use super::WatcherContext;
use crate::chains::ContractEvent;
use crate::events::RelayerEvent;

/// Consumes verifier events and keeps the home chain's proofs attached.
pub struct HomeWatcher {
    ctx: WatcherContext,
    retry_interval: Duration,
    /// Head block at the first successful subscription. Resubscriptions never
    /// replay from earlier than this, even before any creation event arrived.
    replay_floor: Option<u64>,
    /// Block of the newest creation event seen.
    last_block: Option<u64>,
}

impl HomeWatcher {
    pub fn new(ctx: WatcherContext, retry_interval: Duration) -> Self {
        Self {
            ctx,
            retry_interval,
            replay_floor: None,
            last_block: None,
        }
    }

    /// Block the next subscription replays from.
    pub fn replay_from(&self) -> Option<u64> {
        match (self.replay_floor, self.last_block) {
            (Some(floor), Some(last)) => Some(floor.max(last)),
            (floor, last) => floor.or(last),
        }
    }

    /// Run until cancelled, resubscribing whenever the event stream ends.
    pub async fn run(mut self) {
        let mut retry = interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut resubscribing = false;

        info!("Monitoring Arbitrum for operations");

        loop {
            let subscription = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                result = self.ctx.contract.subscribe(self.replay_from()) => result,
            };

            match subscription {
                Ok(events) => {
                    if self.replay_floor.is_none() {
                        self.record_replay_floor().await;
                    }
                    if resubscribing {
                        let reconciled = self.ctx.reconcile_pending().await;
                        debug!(reconciled, "Reconciled pending operations after resubscribe");
                    }
                    if !self.consume(events, &mut retry).await {
                        break;
                    }
                    warn!(from_block = ?self.replay_from(), "Verifier subscription ended, resubscribing");
                }
                Err(e) => warn!(error = %e, "Failed to subscribe to verifier events"),
            }
            resubscribing = true;

            // One retry period between subscription attempts.
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                _ = retry.tick() => self.retry_missing_proofs(),
            }
        }

        debug!("Home watcher stopped");
    }

    /// Drain one subscription. Returns `false` once cancelled.
    async fn consume(
        &mut self,
        mut events: mpsc::Receiver<ContractEvent>,
        retry: &mut tokio::time::Interval,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return false,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return true,
                },
                _ = retry.tick() => self.retry_missing_proofs(),
            }
        }
    }

    pub async fn handle_event(&mut self, event: ContractEvent) {
        match event {
            ContractEvent::OperationCreated {
                operation_id,
                initiator,
                operation_type,
                amount,
                block_number,
            } => {
                self.last_block = Some(self.last_block.map_or(block_number, |b| b.max(block_number)));

                let operation = Operation::from_creation_event(
                    operation_id,
                    initiator,
                    operation_type,
                    amount,
                    block_number,
                );
                match self.ctx.registry.register(operation) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(operation_id = %operation_id, "Duplicate creation event ignored");
                        return;
                    }
                    Err(e) => {
                        warn!(operation_id = %operation_id, error = %e, "Failed to register operation");
                        return;
                    }
                }

                self.ctx.stats.record_operation();
                info!(
                    operation_id = %operation_id,
                    initiator = ?initiator,
                    operation_type,
                    amount = %amount,
                    block_number,
                    "New operation detected"
                );

                if let Some(guard) = self.ctx.registry.try_claim(operation_id, ChainRole::Arbitrum) {
                    self.ctx.attach_home_proof(guard, block_number).await;
                }
                self.ctx.events.emit(RelayerEvent::OperationDetected {
                    operation_id,
                    initiator,
                    amount,
                    block_number,
                });
            }
            ContractEvent::ConsensusReached {
                operation_id,
                approval_count,
            } => self.ctx.on_consensus(operation_id, approval_count),
            ContractEvent::OperationExecuted {
                operation_id,
                success,
            } => self.ctx.on_executed(operation_id, success),
        }
    }

    /// Remember the current head so a later resubscription can backfill
    /// whatever was emitted while the stream was down.
    async fn record_replay_floor(&mut self) {
        match self.ctx.contract.head_block().await {
            Ok(head) => {
                debug!(head, "Verifier replay floor recorded");
                self.replay_floor = Some(head);
            }
            Err(e) => warn!(error = %e, "Failed to read head block, replay floor unset"),
        }
    }

    /// Re-attempt home proofs for operations registered without one.
    ///
    /// Lookups run on the task tracker so a slow RPC never holds up event
    /// handling; the per-pair claim keeps sweeps from piling up.
    fn retry_missing_proofs(&self) {
        let chain = ChainRole::Arbitrum;
        for operation in self.ctx.registry.awaiting_proof(chain) {
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            let Some(guard) = self.ctx.registry.try_claim(operation.id, chain) else {
                continue;
            };
            let ctx = self.ctx.clone();
            self.ctx.tracker.spawn(async move {
                ctx.attach_home_proof(guard, operation.block_number).await;
            });
        }
    }
}
