//! Merkle commitments over a chain's observation of an operation.
//!
//! The relayer commits to four leaves per proof:
//! `[operation_id, block_reference, validator_address, block_index]`.
//! Missing leaves are padded with [`EMPTY_LEAF`] so the tree always has the
//! same shape and every proof path has exactly two siblings:
//!
//! ```text
//!            root
//!          /      \
//!       n0          n1
//!      /  \        /  \
//!    h0    h1    h2    h3
//! ```
//!
//! Leaves are hashed as `keccak256(leaf_bytes)` and nodes as
//! `keccak256(left || right)`.

use ethers::types::H256;
use ethers::utils::keccak256;

use crate::error::RelayError;

/// Number of leaves in the fixed commitment.
pub const QUAD_LEAF_COUNT: usize = 4;

/// Padding leaf: the zero hash in its `0x`-prefixed text form.
pub const EMPTY_LEAF: &[u8] =
    b"0x0000000000000000000000000000000000000000000000000000000000000000";

/// A commitment scheme producing a root and per-leaf inclusion paths.
pub trait MerkleCommitment: Send + Sync {
    /// Commit to `leaves`, in order.
    fn commit(&self, leaves: &[Vec<u8>]) -> Result<Commitment, RelayError>;
}

/// A built tree: every level from leaf hashes up to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment {
    levels: Vec<Vec<H256>>,
}

impl Commitment {
    /// Build from already-hashed leaves. The leaf count must be a power of two.
    fn from_leaf_hashes(leaf_hashes: Vec<H256>) -> Self {
        let mut levels = vec![leaf_hashes];
        while levels.last().map_or(false, |level| level.len() > 1) {
            let next = levels
                .last()
                .map(|level| {
                    level
                        .chunks(2)
                        .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                        .collect()
                })
                .unwrap_or_default();
            levels.push(next);
        }
        Self { levels }
    }

    /// Root hash.
    pub fn root(&self) -> H256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_default()
    }

    /// Hashed leaves, in order.
    pub fn leaf_hashes(&self) -> &[H256] {
        &self.levels[0]
    }

    /// Sibling path for the leaf at `index`, bottom-up.
    pub fn proof_for(&self, index: usize) -> Option<Vec<H256>> {
        if index >= self.levels[0].len() {
            return None;
        }

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = level.get(position ^ 1).unwrap_or(&level[position]);
            path.push(*sibling);
            position /= 2;
        }
        Some(path)
    }
}

/// Constant-shape four-leaf commitment.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedQuadCommitment;

impl MerkleCommitment for FixedQuadCommitment {
    fn commit(&self, leaves: &[Vec<u8>]) -> Result<Commitment, RelayError> {
        if leaves.len() > QUAD_LEAF_COUNT {
            return Err(RelayError::InvalidInput(format!(
                "commitment takes at most {} leaves, got {}",
                QUAD_LEAF_COUNT,
                leaves.len()
            )));
        }

        let mut hashed: Vec<H256> = leaves.iter().map(|leaf| hash_leaf(leaf)).collect();
        hashed.resize(QUAD_LEAF_COUNT, hash_leaf(EMPTY_LEAF));

        Ok(Commitment::from_leaf_hashes(hashed))
    }
}

/// Recompute the root from a leaf hash and its sibling path.
pub fn verify_proof(leaf_hash: H256, index: usize, proof: &[H256], root: H256) -> bool {
    let mut current = leaf_hash;
    let mut position = index;

    for sibling in proof {
        current = if position % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position /= 2;
    }

    current == root
}

/// Hash a raw leaf.
pub fn hash_leaf(leaf: &[u8]) -> H256 {
    H256::from(keccak256(leaf))
}

fn hash_pair(left: &H256, right: &H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    H256::from(keccak256(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(values: &[&str]) -> Vec<Vec<u8>> {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_four_leaf_proof_verifies() {
        let commitment = FixedQuadCommitment
            .commit(&leaves(&["0x01", "0xblock", "0xvalidator", "1000"]))
            .expect("commit should succeed");

        let proof = commitment.proof_for(0).expect("index 0 is in range");
        assert_eq!(proof.len(), 2);
        assert!(verify_proof(
            commitment.leaf_hashes()[0],
            0,
            &proof,
            commitment.root()
        ));
    }

    #[test]
    fn test_padded_proof_verifies() {
        let commitment = FixedQuadCommitment
            .commit(&leaves(&["0x01", "0xblock"]))
            .expect("commit should succeed");

        assert_eq!(commitment.leaf_hashes().len(), QUAD_LEAF_COUNT);
        assert_eq!(commitment.leaf_hashes()[2], hash_leaf(EMPTY_LEAF));
        assert_eq!(commitment.leaf_hashes()[3], hash_leaf(EMPTY_LEAF));

        let proof = commitment.proof_for(0).unwrap();
        assert_eq!(proof.len(), 2);
        assert!(verify_proof(
            commitment.leaf_hashes()[0],
            0,
            &proof,
            commitment.root()
        ));
    }

    #[test]
    fn test_proof_shape_matches_pair_rule() {
        let commitment = FixedQuadCommitment
            .commit(&leaves(&["a", "b", "c", "d"]))
            .unwrap();
        let h = commitment.leaf_hashes().to_vec();
        let n0 = hash_pair(&h[0], &h[1]);
        let n1 = hash_pair(&h[2], &h[3]);

        assert_eq!(commitment.root(), hash_pair(&n0, &n1));
        assert_eq!(commitment.proof_for(0).unwrap(), vec![h[1], n1]);
        assert_eq!(commitment.proof_for(1).unwrap(), vec![h[0], n1]);
        assert_eq!(commitment.proof_for(2).unwrap(), vec![h[3], n0]);
        assert_eq!(commitment.proof_for(3).unwrap(), vec![h[2], n0]);
        assert!(commitment.proof_for(4).is_none());
    }

    #[test]
    fn test_tampered_leaf_fails() {
        let commitment = FixedQuadCommitment
            .commit(&leaves(&["0x01", "0xblock", "0xvalidator", "1000"]))
            .unwrap();
        let proof = commitment.proof_for(0).unwrap();

        assert!(!verify_proof(hash_leaf(b"0x02"), 0, &proof, commitment.root()));
        assert!(!verify_proof(commitment.leaf_hashes()[0], 1, &proof, commitment.root()));
    }

    #[test]
    fn test_too_many_leaves_rejected() {
        let result = FixedQuadCommitment.commit(&leaves(&["a", "b", "c", "d", "e"]));
        assert!(matches!(result, Err(RelayError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn prop_every_leaf_verifies(
            raw in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..48), 0..=4)
        ) {
            let commitment = FixedQuadCommitment.commit(&raw).unwrap();
            for index in 0..QUAD_LEAF_COUNT {
                let proof = commitment.proof_for(index).unwrap();
                prop_assert_eq!(proof.len(), 2);
                prop_assert!(verify_proof(
                    commitment.leaf_hashes()[index],
                    index,
                    &proof,
                    commitment.root()
                ));
            }
        }
    }
}
