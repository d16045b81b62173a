//! Relayer lifecycle and progress events.

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use trinity_core::{ChainRole, OperationId};

/// Capacity of the event broadcast channel. Slow subscribers lag, they never block the relayer.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the relayer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayerEvent {
    /// Relayer started; watchers are running.
    Started {
        validators: Vec<(ChainRole, Address)>,
    },
    /// Relayer stopped; no new proofs will be generated.
    Stopped {
        reason: String,
    },
    /// A new operation was registered from a home-chain creation event.
    OperationDetected {
        operation_id: OperationId,
        initiator: Address,
        amount: U256,
        block_number: u64,
    },
    /// A proof was confirmed by the verifier.
    ProofSubmitted {
        operation_id: OperationId,
        chain: ChainRole,
        tx_hash: H256,
        nonce: u64,
    },
    /// The verifier already counted this chain for the operation.
    ProofSkipped {
        operation_id: OperationId,
        chain: ChainRole,
        reason: String,
    },
    /// Generation or submission failed; the next tick retries.
    SubmissionFailed {
        operation_id: OperationId,
        chain: ChainRole,
        error: String,
    },
    /// The verifier reached 2-of-3 consensus.
    ConsensusReached {
        operation_id: OperationId,
        approval_count: u8,
    },
    /// The verifier executed the operation.
    OperationExecuted {
        operation_id: OperationId,
        success: bool,
    },
}

/// Cloneable sender side of the event stream.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<RelayerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: RelayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
