//! Chain watchers.
//!
//! - [`HomeWatcher`]: reacts to verifier events on Arbitrum and attaches the
//!   home chain's own proof.
//! - [`SecondaryWatcher`]: one per polled chain (Solana, TON); on every tick
//!   proves and submits operations still missing that chain's proof.
//!
//! Per-operation work runs on a shared [`TaskTracker`] so stopping the
//! watchers never aborts a submission that is already on its way.

mod home;
mod secondary;

pub use home::HomeWatcher;
pub use secondary::SecondaryWatcher;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use trinity_core::{
    BlockReference, InFlightGuard, OperationId, OperationRegistry, OperationStatus,
    OperationStatusInfo, ProofGenerator, StatsRecorder, Transition,
};

use crate::chains::ConsensusContract;
use crate::events::{EventBus, RelayerEvent};
use crate::submission::SubmissionClient;

/// Shared state handed to every watcher.
#[derive(Clone)]
pub struct WatcherContext {
    pub registry: Arc<OperationRegistry>,
    pub proofs: Arc<ProofGenerator>,
    pub submissions: Arc<SubmissionClient>,
    pub contract: Arc<dyn ConsensusContract>,
    pub stats: Arc<StatsRecorder>,
    pub events: EventBus,
    pub cancel: CancellationToken,
    pub tracker: TaskTracker,
}

impl WatcherContext {
    /// Generate and submit the proof for a claimed (operation, chain) pair.
    ///
    /// The claim is held until the submission outcome is recorded.
    pub async fn prove_and_submit(&self, guard: InFlightGuard, reference: BlockReference) {
        let operation_id = guard.operation_id();
        let chain = guard.chain();

        // Stop requested after the task was queued: no new nonce may be drawn.
        if self.cancel.is_cancelled() {
            debug!(operation_id = %operation_id, chain = %chain, "Relayer stopping, proof skipped");
            return;
        }

        // Consensus or another proof may have landed since the scan.
        match self.registry.get(&operation_id) {
            Some(operation) if operation.needs_proof_from(chain) => {}
            _ => return,
        }

        let proof = match self.proofs.generate(operation_id, chain, &reference).await {
            Ok(proof) => proof,
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    operation_id = %operation_id,
                    chain = %chain,
                    error = %e,
                    "Proof generation failed"
                );
                self.events.emit(RelayerEvent::SubmissionFailed {
                    operation_id,
                    chain,
                    error: e.to_string(),
                });
                return;
            }
        };

        self.submissions.submit_and_record(proof).await;
        drop(guard);
    }

    /// Build the home proof at the creation block and attach it locally.
    ///
    /// The verifier lives on the home chain and records the home observation
    /// itself, so nothing is submitted. Failures leave the operation for the
    /// home retry sweep.
    pub async fn attach_home_proof(&self, guard: InFlightGuard, block_number: u64) {
        let operation_id = guard.operation_id();
        let chain = guard.chain();
        if self.cancel.is_cancelled() {
            return;
        }

        let reference = match self.contract.block_reference(block_number).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(
                    operation_id = %operation_id,
                    chain = %chain,
                    block_number,
                    error = %e,
                    "Home block lookup failed, will retry"
                );
                return;
            }
        };

        let proof = match self.proofs.generate(operation_id, chain, &reference).await {
            Ok(proof) => proof,
            Err(e) => {
                warn!(
                    operation_id = %operation_id,
                    chain = %chain,
                    error = %e,
                    "Home proof generation failed, will retry"
                );
                return;
            }
        };

        let nonce = proof.nonce;
        match self.registry.attach_proof(proof) {
            Ok(_) => debug!(operation_id = %operation_id, chain = %chain, nonce, block_number, "Home proof attached"),
            Err(e) => warn!(operation_id = %operation_id, chain = %chain, error = %e, "Failed to attach home proof"),
        }
        drop(guard);
    }

    /// Mirror the verifier's consensus signal.
    pub fn on_consensus(&self, operation_id: OperationId, approval_count: u8) {
        match self.registry.mark_consensus_reached(&operation_id, approval_count) {
            Ok(Transition::Applied) => {
                self.stats.record_consensus();
                info!(operation_id = %operation_id, approval_count, "Consensus reached");
                self.events.emit(RelayerEvent::ConsensusReached {
                    operation_id,
                    approval_count,
                });
            }
            Ok(Transition::Unchanged) => {
                debug!(operation_id = %operation_id, "Consensus already recorded")
            }
            Ok(Transition::UnknownOperation) => {
                debug!(operation_id = %operation_id, "Consensus for untracked operation ignored")
            }
            Err(e) => warn!(operation_id = %operation_id, error = %e, "Failed to record consensus"),
        }
    }

    /// Mirror the verifier's execution signal.
    pub fn on_executed(&self, operation_id: OperationId, success: bool) {
        match self.registry.mark_executed(&operation_id, success) {
            Ok(Transition::Applied) => {
                info!(operation_id = %operation_id, success, "Operation executed");
                self.events.emit(RelayerEvent::OperationExecuted {
                    operation_id,
                    success,
                });
            }
            Ok(Transition::Unchanged) => {
                debug!(operation_id = %operation_id, "Execution already recorded")
            }
            Ok(Transition::UnknownOperation) => {
                debug!(operation_id = %operation_id, "Execution of untracked operation ignored")
            }
            Err(e) => warn!(operation_id = %operation_id, error = %e, "Failed to record execution"),
        }
    }

    /// Apply a `getOperationStatus` answer.
    pub fn apply_status(&self, operation_id: OperationId, info: OperationStatusInfo) {
        match info.status {
            OperationStatus::Approved => self.on_consensus(operation_id, info.approval_count),
            OperationStatus::Executed => self.on_executed(operation_id, true),
            OperationStatus::Cancelled => self.on_executed(operation_id, false),
            OperationStatus::Pending | OperationStatus::Unknown(_) => {}
        }
    }

    /// Catch pending operations up with the verifier, e.g. after a restart or
    /// a dropped subscription. Returns how many were queried successfully.
    pub async fn reconcile_pending(&self) -> usize {
        let mut reconciled = 0;
        for operation in self.registry.pending_operations() {
            match self.contract.operation_status(&operation.id).await {
                Ok(info) => {
                    self.apply_status(operation.id, info);
                    reconciled += 1;
                }
                Err(e) => debug!(
                    operation_id = %operation.id,
                    error = %e,
                    "Status reconciliation failed"
                ),
            }
        }
        reconciled
    }
}
