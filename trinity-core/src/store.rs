//! Durable relayer state.
//!
//! Operations are keyed by operation id in the `operations` tree; the next
//! unissued nonce of each chain role is kept in the `nonces` tree keyed by the
//! verifier chain id. Both are reconciled with the verifier on startup, so
//! the store only has to guarantee that nothing already issued is forgotten.

use std::path::Path;
use std::sync::Arc;

use sled::Db;

use crate::error::RelayError;
use crate::types::{ChainRole, Operation, OperationId};

const OPERATIONS_TREE: &str = "operations";
const NONCES_TREE: &str = "nonces";

/// sled-backed store for operations and nonce counters.
#[derive(Clone)]
pub struct RelayerStore {
    db: Arc<Db>,
}

impl RelayerStore {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    RelayError::Storage(format!(
                        "failed to create directory for relayer db at {}: {}",
                        path_ref.display(),
                        err
                    ))
                })?;
            }
        }

        let db = sled::open(path_ref)?;
        tracing::debug!(path = %path_ref.display(), "Relayer store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create a throwaway store that is deleted on drop.
    pub fn temporary() -> Result<Self, RelayError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or replace an operation.
    pub fn put_operation(&self, operation: &Operation) -> Result<(), RelayError> {
        let tree = self.db.open_tree(OPERATIONS_TREE)?;
        let value = serde_json::to_vec(operation)?;
        tree.insert(operation.id.as_bytes(), value)?;
        Ok(())
    }

    /// Fetch a single operation.
    pub fn get_operation(&self, id: &OperationId) -> Result<Option<Operation>, RelayError> {
        let tree = self.db.open_tree(OPERATIONS_TREE)?;
        match tree.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Load every stored operation. Entries that fail to decode are skipped.
    pub fn load_operations(&self) -> Result<Vec<Operation>, RelayError> {
        let tree = self.db.open_tree(OPERATIONS_TREE)?;
        let mut operations = Vec::new();

        for item in tree.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<Operation>(&value) {
                Ok(operation) => operations.push(operation),
                Err(err) => tracing::warn!(
                    key = %hex::encode(&key),
                    error = %err,
                    "Skipping undecodable operation record"
                ),
            }
        }

        Ok(operations)
    }

    /// Record the next unissued nonce for `chain`.
    pub fn put_next_nonce(&self, chain: ChainRole, next: u64) -> Result<(), RelayError> {
        let tree = self.db.open_tree(NONCES_TREE)?;
        tree.insert([chain.chain_id()], next.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Next unissued nonce for `chain`, if one was recorded.
    pub fn next_nonce(&self, chain: ChainRole) -> Result<Option<u64>, RelayError> {
        let tree = self.db.open_tree(NONCES_TREE)?;
        let Some(value) = tree.get([chain.chain_id()])? else {
            return Ok(None);
        };

        let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| {
            RelayError::Storage(format!("corrupt nonce record for {}", chain))
        })?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), RelayError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for RelayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerStore")
            .field("was_recovered", &self.db.was_recovered())
            .finish()
    }
}
