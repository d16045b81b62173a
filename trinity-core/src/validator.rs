//! Signing capabilities for chain roles.
//!
//! Each chain role signs its proofs through its own [`ChainValidator`], so
//! key custody can differ per role (e.g. a hardware-backed key for one chain)
//! without touching proof generation. A deployment with a single validator key
//! registers the same validator for all three roles.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;

use crate::error::RelayError;
use crate::types::ChainRole;

/// Capability to sign proof digests on behalf of one chain role.
#[async_trait]
pub trait ChainValidator: Send + Sync {
    /// Validator identity the verifier knows this role by.
    fn address(&self) -> Address;

    /// Sign a 32-byte payload digest, returning the 65-byte `r || s || v` signature.
    async fn sign_digest(&self, digest: [u8; 32]) -> Result<Vec<u8>, RelayError>;
}

/// Validator backed by an in-process secp256k1 key.
///
/// Signs the digest as an EIP-191 personal message, which is what the verifier
/// recovers against.
#[derive(Clone, Debug)]
pub struct LocalValidator {
    wallet: LocalWallet,
}

impl LocalValidator {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Parse a hex private key (with or without `0x`).
    pub fn from_private_key(key: &str) -> Result<Self, RelayError> {
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| RelayError::Config(format!("invalid validator private key: {}", e)))?;
        Ok(Self { wallet })
    }

    /// Underlying wallet, for transaction signing on the home chain.
    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

#[async_trait]
impl ChainValidator for LocalValidator {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_digest(&self, digest: [u8; 32]) -> Result<Vec<u8>, RelayError> {
        let signature = self
            .wallet
            .sign_message(digest)
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

/// Validators indexed by chain role.
#[derive(Clone, Default)]
pub struct ValidatorSet {
    validators: BTreeMap<ChainRole, Arc<dyn ChainValidator>>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One validator identity authorizing all three roles.
    pub fn shared(validator: Arc<dyn ChainValidator>) -> Self {
        let mut set = Self::new();
        for chain in ChainRole::ALL {
            set.validators.insert(chain, validator.clone());
        }
        set
    }

    /// Assign (or replace) the validator for `chain`.
    pub fn with_validator(mut self, chain: ChainRole, validator: Arc<dyn ChainValidator>) -> Self {
        self.validators.insert(chain, validator);
        self
    }

    pub fn get(&self, chain: ChainRole) -> Option<&Arc<dyn ChainValidator>> {
        self.validators.get(&chain)
    }

    /// Roles without a validator.
    pub fn missing_roles(&self) -> Vec<ChainRole> {
        ChainRole::ALL
            .into_iter()
            .filter(|chain| !self.validators.contains_key(chain))
            .collect()
    }

    /// Each role with its validator address.
    pub fn addresses(&self) -> Vec<(ChainRole, Address)> {
        self.validators
            .iter()
            .map(|(chain, validator)| (*chain, validator.address()))
            .collect()
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.addresses()).finish()
    }
}
