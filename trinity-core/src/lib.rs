//! trinity-core
//!
//! Building blocks of the Trinity Protocol proof relayer: everything needed to
//! turn "chain X observed operation O at block B" into a signed, replay-safe
//! `CrossChainProof`, and to track which chains have corroborated which
//! operations.
//!
//! # Architecture
//!
//! ```text
//!   BlockReference ──┐
//!                    ▼
//!   OperationId ──► ProofGenerator ──► CrossChainProof ──► OperationRegistry
//!                    │   │    │                               │
//!        MerkleCommitment │  ChainValidator               RelayerStore
//!                    NonceManager ────────────────────────────┘
//! ```
//!
//! - [`merkle`]: fixed four-leaf keccak commitment behind the
//!   [`MerkleCommitment`] trait.
//! - [`nonce`]: per-role strictly increasing validator nonces.
//! - [`proof`]: leaf layout, payload digest and signing.
//! - [`registry`]: pending operations, attached proofs, in-flight guards and
//!   the consensus state machine mirrored from the verifier contract.
//! - [`store`]: sled-backed persistence for operations and nonces.
//! - [`stats`]: relayer counters.
//! - [`validator`]: signing capability per chain role.
//!
//! Chain access (RPC, contract bindings, event streams) lives in the
//! `trinity-relayer` crate; nothing in here performs network I/O.

pub mod error;
pub mod merkle;
pub mod nonce;
pub mod proof;
pub mod registry;
pub mod stats;
pub mod store;
pub mod types;
pub mod validator;

pub use error::{is_duplicate_revert, RelayError};
pub use merkle::{verify_proof, Commitment, FixedQuadCommitment, MerkleCommitment};
pub use nonce::NonceManager;
pub use proof::{payload_digest, ProofGenerator};
pub use registry::{InFlightGuard, OperationRegistry, Transition};
pub use stats::{RelayerStats, StatsRecorder};
pub use store::RelayerStore;
pub use types::*;
pub use validator::{ChainValidator, LocalValidator, ValidatorSet};

/// Number of chain approvals the verifier requires before an operation may execute.
pub const CONSENSUS_THRESHOLD: usize = 2;

/// Number of chains participating in consensus.
pub const CHAIN_COUNT: usize = 3;
