//! Validator nonce management.
//!
//! The verifier rejects proofs whose nonce it has already seen for a
//! validator, so each role's counter must only ever move forward. Counters
//! are seeded from the verifier's `getValidatorNonce` at startup and written
//! through to the store before a value is handed out, so a crash can never
//! cause a value to be issued twice.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::RelayError;
use crate::store::RelayerStore;
use crate::types::ChainRole;

/// Per-role strictly increasing nonce counters.
#[derive(Debug)]
pub struct NonceManager {
    /// Next unissued nonce per role.
    counters: Mutex<BTreeMap<ChainRole, u64>>,
    store: RelayerStore,
}

impl NonceManager {
    pub fn new(store: RelayerStore) -> Self {
        Self {
            counters: Mutex::new(BTreeMap::new()),
            store,
        }
    }

    /// Seed `chain` from an authoritative on-chain nonce.
    ///
    /// The counter becomes the maximum of the on-chain value, the persisted
    /// value and the current in-memory value; it never moves backwards.
    /// Returns the next nonce that will be issued.
    pub fn seed(&self, chain: ChainRole, on_chain: u64) -> Result<u64, RelayError> {
        let persisted = self.store.next_nonce(chain)?.unwrap_or(0);
        let mut counters = self.lock()?;
        let current = counters.get(&chain).copied().unwrap_or(0);

        let next = on_chain.max(persisted).max(current);
        self.store.put_next_nonce(chain, next)?;
        counters.insert(chain, next);

        debug!(
            chain = %chain,
            on_chain,
            persisted,
            next,
            "Validator nonce seeded"
        );
        Ok(next)
    }

    /// Seed `chain` without an on-chain value (verifier unreachable at startup).
    pub fn seed_from_store(&self, chain: ChainRole) -> Result<u64, RelayError> {
        self.seed(chain, 0)
    }

    /// Issue the next nonce for `chain`.
    ///
    /// The increment is persisted before the value is returned; if
    /// persistence fails no nonce is issued.
    pub fn get_and_increment(&self, chain: ChainRole) -> Result<u64, RelayError> {
        let mut counters = self.lock()?;
        let issued = match counters.get(&chain) {
            Some(next) => *next,
            None => self.store.next_nonce(chain)?.unwrap_or(0),
        };

        let next = issued
            .checked_add(1)
            .ok_or_else(|| RelayError::InvalidInput(format!("nonce overflow for {}", chain)))?;
        self.store.put_next_nonce(chain, next)?;
        counters.insert(chain, next);

        Ok(issued)
    }

    /// Next nonce that would be issued for `chain`, if seeded.
    pub fn peek(&self, chain: ChainRole) -> Option<u64> {
        self.counters
            .lock()
            .ok()
            .and_then(|counters| counters.get(&chain).copied())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ChainRole, u64>>, RelayError> {
        self.counters
            .lock()
            .map_err(|_| RelayError::Storage("nonce counters poisoned".into()))
    }
}
