//! Operation registry and consensus state machine.
//!
//! The registry is the relayer's single source of truth about operations:
//! which exist, which chains have proofs attached, and how far each has
//! progressed on the verifier. Every mutation is written through to the
//! [`RelayerStore`] so a restart resumes where the previous run stopped.
//!
//! State only moves forward:
//!
//! ```text
//! Created ──► ConsensusReached ──► Executed
//!    └──────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::store::RelayerStore;
use crate::types::{ChainRole, CrossChainProof, Operation, OperationId, OperationState};

type InFlightSet = Arc<Mutex<HashSet<(OperationId, ChainRole)>>>;

/// Result of applying a verifier-reported transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The operation moved to the new state.
    Applied,
    /// The operation was already at or past the new state.
    Unchanged,
    /// No operation with that id is registered.
    UnknownOperation,
}

/// Registered operations plus the set of (operation, chain) submissions in flight.
#[derive(Debug)]
pub struct OperationRegistry {
    operations: RwLock<HashMap<OperationId, Operation>>,
    in_flight: InFlightSet,
    store: RelayerStore,
}

impl OperationRegistry {
    pub fn new(store: RelayerStore) -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            store,
        }
    }

    /// Load persisted operations into memory. Returns how many were loaded.
    pub fn restore(&self) -> Result<usize, RelayError> {
        let restored = self.store.load_operations()?;
        let mut operations = self.write()?;
        let count = restored.len();
        for operation in restored {
            operations.entry(operation.id).or_insert(operation);
        }
        info!(count, "Restored operations from store");
        Ok(count)
    }

    /// Register a newly observed operation.
    ///
    /// Returns `false` without touching the existing record if the id is
    /// already known (re-delivered creation event).
    pub fn register(&self, operation: Operation) -> Result<bool, RelayError> {
        let mut operations = self.write()?;
        if operations.contains_key(&operation.id) {
            debug!(operation_id = %operation.id, "Operation already registered");
            return Ok(false);
        }

        self.store.put_operation(&operation)?;
        operations.insert(operation.id, operation);
        Ok(true)
    }

    /// Attach a proof to its operation.
    ///
    /// At most one proof per chain is kept; a second proof for the same
    /// (operation, chain) pair is rejected with [`RelayError::DuplicateProof`].
    pub fn attach_proof(&self, proof: CrossChainProof) -> Result<usize, RelayError> {
        let mut operations = self.write()?;
        let operation = operations
            .get_mut(&proof.operation_id)
            .ok_or(RelayError::UnknownOperation(proof.operation_id))?;

        if operation.has_proof(proof.chain) {
            return Err(RelayError::DuplicateProof {
                operation_id: proof.operation_id,
                chain: proof.chain,
            });
        }

        let mut updated = operation.clone();
        updated.proofs.insert(proof.chain, proof);
        self.store.put_operation(&updated)?;

        let count = updated.proof_count();
        *operation = updated;
        Ok(count)
    }

    /// Mirror a `ConsensusReached` event.
    pub fn mark_consensus_reached(
        &self,
        id: &OperationId,
        approval_count: u8,
    ) -> Result<Transition, RelayError> {
        self.transition(id, |state| match state {
            OperationState::Created => Some(OperationState::ConsensusReached { approval_count }),
            _ => None,
        })
    }

    /// Mirror an `OperationExecuted` event. Executed is terminal.
    pub fn mark_executed(&self, id: &OperationId, success: bool) -> Result<Transition, RelayError> {
        self.transition(id, |state| match state {
            OperationState::Executed { .. } => None,
            _ => Some(OperationState::Executed { success }),
        })
    }

    fn transition<F>(&self, id: &OperationId, next: F) -> Result<Transition, RelayError>
    where
        F: FnOnce(OperationState) -> Option<OperationState>,
    {
        let mut operations = self.write()?;
        let Some(operation) = operations.get_mut(id) else {
            return Ok(Transition::UnknownOperation);
        };

        let Some(state) = next(operation.state) else {
            return Ok(Transition::Unchanged);
        };

        let mut updated = operation.clone();
        updated.state = state;
        self.store.put_operation(&updated)?;
        debug!(operation_id = %id, state = ?state, "Operation state advanced");

        *operation = updated;
        Ok(Transition::Applied)
    }

    /// Snapshot of one operation.
    pub fn get(&self, id: &OperationId) -> Option<Operation> {
        self.operations
            .read()
            .ok()
            .and_then(|operations| operations.get(id).cloned())
    }

    /// Every tracked operation, oldest first, whatever its state.
    pub fn operations(&self) -> Vec<Operation> {
        self.collect(|_| true)
    }

    /// Operations that have not reached consensus, oldest first.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.collect(|operation| !operation.consensus_reached())
    }

    fn collect<F>(&self, keep: F) -> Vec<Operation>
    where
        F: Fn(&Operation) -> bool,
    {
        let mut selected: Vec<Operation> = match self.operations.read() {
            Ok(operations) => operations
                .values()
                .filter(|operation| keep(operation))
                .cloned()
                .collect(),
            Err(_) => {
                warn!("Operation registry lock poisoned");
                Vec::new()
            }
        };
        selected.sort_by_key(|operation| (operation.created_at, operation.block_number));
        selected
    }

    /// Operations a watcher for `chain` should produce a proof for.
    pub fn awaiting_proof(&self, chain: ChainRole) -> Vec<Operation> {
        self.pending_operations()
            .into_iter()
            .filter(|operation| operation.needs_proof_from(chain))
            .collect()
    }

    /// Claim the (operation, chain) submission slot.
    ///
    /// Returns `None` if a submission for the pair is already running. The
    /// slot is released when the guard drops.
    pub fn try_claim(&self, id: OperationId, chain: ChainRole) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().ok()?;
        if !in_flight.insert((id, chain)) {
            return None;
        }
        Some(InFlightGuard {
            key: (id, chain),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Whether a submission for the pair is running.
    pub fn is_in_flight(&self, id: &OperationId, chain: ChainRole) -> bool {
        self.in_flight
            .lock()
            .map(|in_flight| in_flight.contains(&(*id, chain)))
            .unwrap_or(false)
    }

    /// Flush pending store writes.
    pub fn flush(&self) -> Result<(), RelayError> {
        self.store.flush()
    }

    pub fn len(&self) -> usize {
        self.operations.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<OperationId, Operation>>, RelayError> {
        self.operations
            .write()
            .map_err(|_| RelayError::Storage("operation registry poisoned".into()))
    }
}

/// Exclusive claim on one (operation, chain) submission.
#[derive(Debug)]
pub struct InFlightGuard {
    key: (OperationId, ChainRole),
    in_flight: InFlightSet,
}

impl InFlightGuard {
    pub fn operation_id(&self) -> OperationId {
        self.key.0
    }

    pub fn chain(&self) -> ChainRole {
        self.key.1
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}
