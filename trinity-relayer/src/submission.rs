//! Proof submission to the consensus verifier.
//!
//! Every submission ends in exactly one of three outcomes:
//!
//! | Outcome           | `proofsSubmitted` | `failedSubmissions` | proof attached |
//! |-------------------|-------------------|---------------------|----------------|
//! | `Confirmed`       | +1                | -                   | yes            |
//! | `AlreadyApproved` | -                 | -                   | yes            |
//! | `Failed`          | -                 | +1                  | no             |

use std::sync::Arc;
use std::time::{Duration, Instant};

use ethers::types::H256;
use tracing::{debug, info, warn};

use trinity_core::{CrossChainProof, OperationRegistry, RelayError, StatsRecorder};

use crate::chains::ConsensusContract;
use crate::events::{EventBus, RelayerEvent};

/// Classified result of one `submitChainProof` attempt.
#[derive(Debug)]
pub enum SubmissionOutcome {
    /// Mined successfully.
    Confirmed { tx_hash: H256, latency: Duration },
    /// The verifier had already counted this chain; treated as success.
    AlreadyApproved { reason: String },
    /// Anything else. The proof is discarded and a later tick retries.
    Failed(RelayError),
}

impl SubmissionOutcome {
    pub fn from_result(result: Result<H256, RelayError>, latency: Duration) -> Self {
        match result {
            Ok(tx_hash) => SubmissionOutcome::Confirmed { tx_hash, latency },
            Err(e) if e.is_duplicate_submission() => SubmissionOutcome::AlreadyApproved {
                reason: e.to_string(),
            },
            Err(e) => SubmissionOutcome::Failed(e),
        }
    }

    /// Whether the chain now counts as approved for the operation.
    pub fn is_success(&self) -> bool {
        !matches!(self, SubmissionOutcome::Failed(_))
    }
}

/// Submits proofs and records their outcome in the registry, stats and event stream.
pub struct SubmissionClient {
    contract: Arc<dyn ConsensusContract>,
    gas_limit: u64,
    registry: Arc<OperationRegistry>,
    stats: Arc<StatsRecorder>,
    events: EventBus,
}

impl SubmissionClient {
    pub fn new(
        contract: Arc<dyn ConsensusContract>,
        gas_limit: u64,
        registry: Arc<OperationRegistry>,
        stats: Arc<StatsRecorder>,
        events: EventBus,
    ) -> Self {
        Self {
            contract,
            gas_limit,
            registry,
            stats,
            events,
        }
    }

    /// Submit without recording anything.
    pub async fn submit(&self, proof: &CrossChainProof) -> SubmissionOutcome {
        let started = Instant::now();
        let result = self.contract.submit_chain_proof(proof, self.gas_limit).await;
        SubmissionOutcome::from_result(result, started.elapsed())
    }

    /// Submit and record the outcome.
    pub async fn submit_and_record(&self, proof: CrossChainProof) -> SubmissionOutcome {
        debug!(
            operation_id = %proof.operation_id,
            chain = %proof.chain,
            nonce = proof.nonce,
            gas_limit = self.gas_limit,
            "Submitting proof"
        );

        let outcome = self.submit(&proof).await;
        self.record(proof, &outcome);
        outcome
    }

    fn record(&self, proof: CrossChainProof, outcome: &SubmissionOutcome) {
        let operation_id = proof.operation_id;
        let chain = proof.chain;
        let nonce = proof.nonce;

        match outcome {
            SubmissionOutcome::Confirmed { tx_hash, latency } => {
                self.stats.record_submission(*latency);
                self.attach(proof);
                info!(
                    operation_id = %operation_id,
                    chain = %chain,
                    nonce,
                    tx_hash = ?tx_hash,
                    latency_ms = latency.as_millis() as u64,
                    "Proof submitted"
                );
                self.events.emit(RelayerEvent::ProofSubmitted {
                    operation_id,
                    chain,
                    tx_hash: *tx_hash,
                    nonce,
                });
            }
            SubmissionOutcome::AlreadyApproved { reason } => {
                self.attach(proof);
                info!(
                    operation_id = %operation_id,
                    chain = %chain,
                    reason = %reason,
                    "Proof already accepted, skipping"
                );
                self.events.emit(RelayerEvent::ProofSkipped {
                    operation_id,
                    chain,
                    reason: reason.clone(),
                });
            }
            SubmissionOutcome::Failed(error) => {
                self.stats.record_failure();
                warn!(
                    operation_id = %operation_id,
                    chain = %chain,
                    nonce,
                    error = %error,
                    "Proof submission failed"
                );
                self.events.emit(RelayerEvent::SubmissionFailed {
                    operation_id,
                    chain,
                    error: error.to_string(),
                });
            }
        }
    }

    fn attach(&self, proof: CrossChainProof) {
        let operation_id = proof.operation_id;
        let chain = proof.chain;
        match self.registry.attach_proof(proof) {
            Ok(count) => debug!(operation_id = %operation_id, chain = %chain, proofs = count, "Proof attached"),
            Err(RelayError::DuplicateProof { .. }) => {
                debug!(operation_id = %operation_id, chain = %chain, "Proof already attached")
            }
            Err(e) => warn!(
                operation_id = %operation_id,
                chain = %chain,
                error = %e,
                "Failed to record proof"
            ),
        }
    }
}
