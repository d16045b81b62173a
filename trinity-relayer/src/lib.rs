//! trinity-relayer
//!
//! Relayer service that turns operations created on the Trinity consensus
//! verifier into 2-of-3 cross-chain consensus.
//!
//! Architecture:
//! 1. Watch the verifier on Arbitrum for `OperationCreated`, `ConsensusReached`
//!    and `OperationExecuted`
//! 2. Attach the home chain's proof as soon as an operation appears
//! 3. Poll Solana and TON, proving each pending operation against their state
//! 4. Submit secondary proofs to the verifier, treating "already approved" as success
//! 5. Mirror consensus and execution back into the local registry

pub mod chains;
pub mod config;
pub mod events;
pub mod health;
pub mod relayer;
pub mod submission;
pub mod watchers;

pub use chains::{ArbitrumClient, ChainReader, ConsensusContract, ContractEvent, SolanaReader, TonReader};
pub use config::{LogFormat, RelayerConfig, RelayerSettings};
pub use events::{EventBus, RelayerEvent};
pub use relayer::TrinityRelayer;
pub use submission::{SubmissionClient, SubmissionOutcome};
