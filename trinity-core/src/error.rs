//! Error types for the Trinity relayer.

use thiserror::Error;

use crate::types::{ChainRole, OperationId};

/// Revert fragments the verifier uses when a chain has already been counted
/// for an operation.
const DUPLICATE_REVERT_MARKERS: [&str; 2] = ["already submitted", "already approved"];

/// Error type for proof generation, submission and relayer state.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Chain RPC unreachable, timed out or answered garbage.
    #[error("rpc error on {chain}: {message}")]
    Rpc { chain: ChainRole, message: String },

    /// The verifier contract rejected a call.
    #[error("contract reverted: {0}")]
    Reverted(String),

    /// A submitted transaction never produced a receipt.
    #[error("transaction dropped: {0}")]
    Dropped(String),

    /// Signing capability missing or failing.
    #[error("signing error: {0}")]
    Signing(String),

    /// A proof for this (operation, chain) pair is already attached.
    #[error("proof for {operation_id:#x} on {chain} already attached")]
    DuplicateProof {
        operation_id: OperationId,
        chain: ChainRole,
    },

    /// Operation is not registered.
    #[error("unknown operation {0:#x}")]
    UnknownOperation(OperationId),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid input error.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Startup configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Shorthand for an RPC failure on `chain`.
    pub fn rpc(chain: ChainRole, message: impl ToString) -> Self {
        RelayError::Rpc {
            chain,
            message: message.to_string(),
        }
    }

    /// Whether the verifier reported that this chain's proof was already counted.
    ///
    /// Revert text can surface either as a decoded revert or inside the node's
    /// RPC error message (gas estimation fails before broadcast), so both are
    /// inspected.
    pub fn is_duplicate_submission(&self) -> bool {
        match self {
            RelayError::Reverted(message) | RelayError::Rpc { message, .. } => {
                is_duplicate_revert(message)
            }
            _ => false,
        }
    }
}

/// Whether a revert message means "this chain already approved the operation".
pub fn is_duplicate_revert(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    DUPLICATE_REVERT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}
