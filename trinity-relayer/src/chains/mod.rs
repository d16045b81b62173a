//! Chain access.
//!
//! The relayer talks to three chains:
//! - Arbitrum, through the [`ConsensusContract`] hosting the verifier.
//! - Solana and TON, read-only, through [`ChainReader`]s that report the
//!   chain's current authoritative position.

mod arbitrum;
mod rpc;
mod solana;
mod ton;

pub use arbitrum::{ArbitrumClient, TrinityConsensusVerifier};
pub use rpc::JsonRpcClient;
pub use solana::SolanaReader;
pub use ton::TonReader;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use tokio::sync::mpsc;

use trinity_core::{
    BlockReference, ChainRole, CrossChainProof, OperationId, OperationStatusInfo, RelayError,
};

/// Lifecycle events emitted by the verifier contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractEvent {
    OperationCreated {
        operation_id: OperationId,
        initiator: Address,
        operation_type: u8,
        amount: U256,
        block_number: u64,
    },
    ConsensusReached {
        operation_id: OperationId,
        approval_count: u8,
    },
    OperationExecuted {
        operation_id: OperationId,
        success: bool,
    },
}

impl ContractEvent {
    pub fn operation_id(&self) -> OperationId {
        match self {
            ContractEvent::OperationCreated { operation_id, .. }
            | ContractEvent::ConsensusReached { operation_id, .. }
            | ContractEvent::OperationExecuted { operation_id, .. } => *operation_id,
        }
    }
}

/// The consensus verifier on the home chain.
#[async_trait]
pub trait ConsensusContract: Send + Sync {
    /// Stream verifier events, replaying from `from_block` when given.
    ///
    /// The receiver closes when the underlying subscription ends.
    async fn subscribe(&self, from_block: Option<u64>) -> Result<mpsc::Receiver<ContractEvent>, RelayError>;

    /// Current home-chain head block number.
    async fn head_block(&self) -> Result<u64, RelayError>;

    /// Hash and timestamp of a home-chain block.
    async fn block_reference(&self, block_number: u64) -> Result<BlockReference, RelayError>;

    /// `getValidatorNonce(validator)`.
    async fn validator_nonce(&self, validator: Address) -> Result<u64, RelayError>;

    /// `submitChainProof(...)`; resolves once the transaction is mined successfully.
    async fn submit_chain_proof(&self, proof: &CrossChainProof, gas_limit: u64) -> Result<H256, RelayError>;

    /// `getOperationStatus(operationId)`.
    async fn operation_status(&self, operation_id: &OperationId) -> Result<OperationStatusInfo, RelayError>;

    /// `hasChainApproved(operationId, chainId)`.
    async fn has_chain_approved(&self, operation_id: &OperationId, chain: ChainRole) -> Result<bool, RelayError>;
}

/// Read access to a secondary chain's current position.
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn role(&self) -> ChainRole;

    /// Latest block reference (slot / seqno and its hash).
    async fn latest_reference(&self) -> Result<BlockReference, RelayError>;
}
