//! Core types for the Trinity relayer.

use std::collections::BTreeMap;
use std::fmt;

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::CONSENSUS_THRESHOLD;

/// Identifier of a cross-chain operation (the verifier's `bytes32 operationId`).
pub type OperationId = H256;

// === Chains ===

/// The three chains taking part in 2-of-3 consensus.
///
/// Arbitrum is the home chain: it hosts the consensus verifier and emits the
/// operation lifecycle events. Solana (slot based) and TON (seqno based) are
/// secondary chains that are polled for their current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    Arbitrum,
    Solana,
    Ton,
}

impl ChainRole {
    /// All chain roles, home chain first.
    pub const ALL: [ChainRole; 3] = [ChainRole::Arbitrum, ChainRole::Solana, ChainRole::Ton];

    /// Chain identifier used by the verifier contract (`uint8 chainId`).
    pub fn chain_id(self) -> u8 {
        match self {
            ChainRole::Arbitrum => 1,
            ChainRole::Solana => 2,
            ChainRole::Ton => 3,
        }
    }

    /// Resolve a verifier chain identifier.
    pub fn from_chain_id(chain_id: u8) -> Option<Self> {
        match chain_id {
            1 => Some(ChainRole::Arbitrum),
            2 => Some(ChainRole::Solana),
            3 => Some(ChainRole::Ton),
            _ => None,
        }
    }

    /// Whether this is the chain hosting the verifier.
    pub fn is_home(self) -> bool {
        self == ChainRole::Arbitrum
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainRole::Arbitrum => "arbitrum",
            ChainRole::Solana => "solana",
            ChainRole::Ton => "ton",
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chain's authoritative position at the moment a proof is taken.
///
/// `number` is the block number on Arbitrum, the slot on Solana and the
/// masterchain seqno on TON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReference {
    /// Block hash / blockhash / root hash, in the chain's native text form.
    pub hash: String,
    /// Block number, slot or seqno.
    pub number: u64,
    /// Unix timestamp (seconds) of the referenced block, or observation time.
    pub timestamp: u64,
}

// === Proofs ===

/// A chain's signed observation of an operation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainProof {
    /// Chain this proof speaks for.
    pub chain: ChainRole,
    /// Operation the proof is bound to.
    pub operation_id: OperationId,
    /// Block reference the commitment was built over.
    pub block_hash: String,
    /// Root of the four-leaf commitment.
    pub merkle_root: H256,
    /// Sibling path for leaf 0 (always two hashes).
    pub merkle_proof: Vec<H256>,
    /// Block number, slot or seqno.
    pub block_number: u64,
    /// Unix timestamp of the reference.
    pub timestamp: u64,
    /// 65-byte validator signature over the payload digest.
    pub validator_signature: Bytes,
    /// Validator nonce consumed by this proof.
    pub nonce: u64,
}

impl CrossChainProof {
    /// Verifier chain identifier for this proof.
    pub fn chain_id(&self) -> u8 {
        self.chain.chain_id()
    }
}

// === Operations ===

/// Local view of an operation's progress, mirrored from verifier events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationState {
    /// Registered, waiting for chain proofs.
    Created,
    /// The verifier emitted `ConsensusReached`.
    ConsensusReached { approval_count: u8 },
    /// The verifier emitted `OperationExecuted`. Terminal.
    Executed { success: bool },
}

/// A cross-chain operation tracked by the relayer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub source_chain: ChainRole,
    /// Destination chain, when the operation names one.
    pub target_chain: Option<ChainRole>,
    pub initiator: Address,
    pub operation_type: u8,
    pub amount: U256,
    /// Home-chain block the creation event was observed in.
    pub block_number: u64,
    /// Unix timestamp (seconds) at which the relayer registered the operation.
    pub created_at: u64,
    /// Attached proofs, at most one per chain.
    pub proofs: BTreeMap<ChainRole, CrossChainProof>,
    pub state: OperationState,
}

impl Operation {
    /// Operation observed through a home-chain `OperationCreated` event.
    pub fn from_creation_event(
        id: OperationId,
        initiator: Address,
        operation_type: u8,
        amount: U256,
        block_number: u64,
    ) -> Self {
        Self {
            id,
            source_chain: ChainRole::Arbitrum,
            target_chain: None,
            initiator,
            operation_type,
            amount,
            block_number,
            created_at: unix_timestamp(),
            proofs: BTreeMap::new(),
            state: OperationState::Created,
        }
    }

    /// Whether the verifier has signalled consensus (or execution).
    pub fn consensus_reached(&self) -> bool {
        !matches!(self.state, OperationState::Created)
    }

    pub fn has_proof(&self, chain: ChainRole) -> bool {
        self.proofs.contains_key(&chain)
    }

    pub fn proof_count(&self) -> usize {
        self.proofs.len()
    }

    /// Whether a watcher for `chain` still has work to do on this operation.
    ///
    /// Operations with consensus, with a proof for `chain`, or with enough
    /// local proofs to meet the threshold are skipped.
    pub fn needs_proof_from(&self, chain: ChainRole) -> bool {
        !self.consensus_reached()
            && !self.has_proof(chain)
            && self.proof_count() < CONSENSUS_THRESHOLD
    }
}

// === Verifier status ===

/// Operation status as reported by `getOperationStatus`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Approved,
    Executed,
    Cancelled,
    Unknown(u8),
}

impl OperationStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => OperationStatus::Pending,
            1 => OperationStatus::Approved,
            2 => OperationStatus::Executed,
            3 => OperationStatus::Cancelled,
            other => OperationStatus::Unknown(other),
        }
    }
}

/// Raw `getOperationStatus` result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatusInfo {
    pub status: OperationStatus,
    pub approval_count: u8,
    pub created_at: u64,
}

/// Consensus status of an operation with per-chain approvals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusStatus {
    pub status: OperationStatus,
    pub approval_count: u8,
    pub created_at: u64,
    pub chain_approvals: BTreeMap<ChainRole, bool>,
}

/// Current unix time in seconds.
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_operation() -> Operation {
        Operation::from_creation_event(
            H256::from_low_u64_be(1),
            Address::repeat_byte(0x11),
            0,
            U256::from(1_000u64),
            1000,
        )
    }

    fn sample_proof(chain: ChainRole) -> CrossChainProof {
        CrossChainProof {
            chain,
            operation_id: H256::from_low_u64_be(1),
            block_hash: "0xabc".into(),
            merkle_root: H256::repeat_byte(1),
            merkle_proof: vec![H256::repeat_byte(2), H256::repeat_byte(3)],
            block_number: 1000,
            timestamp: 1_700_000_000,
            validator_signature: Bytes::from(vec![0u8; 65]),
            nonce: 0,
        }
    }

    #[test]
    fn test_chain_ids_round_trip() {
        for chain in ChainRole::ALL {
            assert_eq!(ChainRole::from_chain_id(chain.chain_id()), Some(chain));
        }
        assert_eq!(ChainRole::from_chain_id(0), None);
        assert!(ChainRole::Arbitrum.is_home());
        assert!(!ChainRole::Ton.is_home());
    }

    #[test]
    fn test_needs_proof_from() {
        let mut op = sample_operation();
        assert!(op.needs_proof_from(ChainRole::Solana));

        op.proofs.insert(ChainRole::Arbitrum, sample_proof(ChainRole::Arbitrum));
        assert!(!op.needs_proof_from(ChainRole::Arbitrum));
        assert!(op.needs_proof_from(ChainRole::Ton));

        // Two local proofs: the third chain may skip.
        op.proofs.insert(ChainRole::Solana, sample_proof(ChainRole::Solana));
        assert!(!op.needs_proof_from(ChainRole::Ton));
    }

    #[test]
    fn test_consensus_state_stops_watchers() {
        let mut op = sample_operation();
        op.state = OperationState::ConsensusReached { approval_count: 2 };
        assert!(op.consensus_reached());
        assert!(!op.needs_proof_from(ChainRole::Solana));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OperationStatus::from_code(0), OperationStatus::Pending);
        assert_eq!(OperationStatus::from_code(2), OperationStatus::Executed);
        assert_eq!(OperationStatus::from_code(9), OperationStatus::Unknown(9));
    }

    #[test]
    fn test_operation_serde() {
        let mut op = sample_operation();
        op.proofs.insert(ChainRole::Ton, sample_proof(ChainRole::Ton));
        let json = serde_json::to_vec(&op).unwrap();
        let decoded: Operation = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, op);
    }
}
