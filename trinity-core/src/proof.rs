//! Cross-chain proof generation.
//!
//! A proof binds an operation to one chain's current state:
//!
//! 1. Commit to `[operation_id, block_hash, validator_address, block_number]`.
//! 2. Draw the role's next validator nonce (exactly once per proof).
//! 3. Sign `keccak256(abi.encode(operationId, chainId, merkleRoot, blockNumber, nonce))`
//!    with the role's validator.

use std::sync::Arc;

use ethers::abi::{encode, Token};
use ethers::types::{Bytes, U256};
use ethers::utils::keccak256;
use tracing::debug;

use crate::error::RelayError;
use crate::merkle::{FixedQuadCommitment, MerkleCommitment};
use crate::nonce::NonceManager;
use crate::types::{BlockReference, ChainRole, CrossChainProof, OperationId};
use crate::validator::ValidatorSet;

/// Index of the operation-id leaf, the leaf every proof path is built for.
pub const OPERATION_LEAF_INDEX: usize = 0;

/// Produces signed proofs for any chain role.
pub struct ProofGenerator<C = FixedQuadCommitment> {
    commitment: C,
    nonces: Arc<NonceManager>,
    validators: ValidatorSet,
}

impl ProofGenerator<FixedQuadCommitment> {
    pub fn new(nonces: Arc<NonceManager>, validators: ValidatorSet) -> Self {
        Self::with_commitment(FixedQuadCommitment, nonces, validators)
    }
}

impl<C: MerkleCommitment> ProofGenerator<C> {
    pub fn with_commitment(commitment: C, nonces: Arc<NonceManager>, validators: ValidatorSet) -> Self {
        Self {
            commitment,
            nonces,
            validators,
        }
    }

    /// Generate `chain`'s proof for `operation_id` at `reference`.
    ///
    /// Fails without consuming a nonce if the role has no validator.
    pub async fn generate(
        &self,
        operation_id: OperationId,
        chain: ChainRole,
        reference: &BlockReference,
    ) -> Result<CrossChainProof, RelayError> {
        let validator = self.validators.get(chain).ok_or_else(|| {
            RelayError::Signing(format!("no validator configured for {}", chain))
        })?;

        let leaves = proof_leaves(operation_id, reference, &format!("{:?}", validator.address()));
        let commitment = self.commitment.commit(&leaves)?;
        let merkle_root = commitment.root();
        let merkle_proof = commitment
            .proof_for(OPERATION_LEAF_INDEX)
            .ok_or_else(|| RelayError::InvalidInput("commitment has no operation leaf".into()))?;

        let nonce = self.nonces.get_and_increment(chain)?;
        let digest = payload_digest(
            operation_id,
            chain.chain_id(),
            merkle_root.to_fixed_bytes(),
            reference.number,
            nonce,
        );
        let signature = validator.sign_digest(digest).await?;

        debug!(
            operation_id = %operation_id,
            chain = %chain,
            block_number = reference.number,
            nonce,
            merkle_root = %merkle_root,
            "Proof generated"
        );

        Ok(CrossChainProof {
            chain,
            operation_id,
            block_hash: reference.hash.clone(),
            merkle_root,
            merkle_proof,
            block_number: reference.number,
            timestamp: reference.timestamp,
            validator_signature: Bytes::from(signature),
            nonce,
        })
    }
}

/// The four commitment leaves, as the byte strings that get hashed.
pub fn proof_leaves(operation_id: OperationId, reference: &BlockReference, validator: &str) -> Vec<Vec<u8>> {
    vec![
        format!("{:?}", operation_id).into_bytes(),
        reference.hash.clone().into_bytes(),
        validator.as_bytes().to_vec(),
        reference.number.to_string().into_bytes(),
    ]
}

/// Digest the verifier recovers the validator signature against.
pub fn payload_digest(
    operation_id: OperationId,
    chain_id: u8,
    merkle_root: [u8; 32],
    block_number: u64,
    nonce: u64,
) -> [u8; 32] {
    let encoded = encode(&[
        Token::FixedBytes(operation_id.as_bytes().to_vec()),
        Token::Uint(U256::from(chain_id)),
        Token::FixedBytes(merkle_root.to_vec()),
        Token::Uint(U256::from(block_number)),
        Token::Uint(U256::from(nonce)),
    ]);
    keccak256(encoded)
}
