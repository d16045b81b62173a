//! The relayer orchestrator.
//!
//! Owns every component and the lifecycle:
//!
//! 1. `start()`: restore persisted operations, seed validator nonces from the
//!    verifier, reconcile restored operations, then spawn the home watcher,
//!    both secondary watchers and the health monitor.
//! 2. `stop()`: cancel watchers and timers. Submissions already in flight keep
//!    running and still record their outcome.
//! 3. `drain()`: wait for those submissions.

use std::collections::BTreeMap;
use std::sync::Arc;

use ethers::types::Address;
use futures::future::try_join_all;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use trinity_core::{
    ChainRole, ConsensusStatus, NonceManager, Operation, OperationId, OperationRegistry,
    ProofGenerator, RelayError, RelayerStats, RelayerStore, StatsRecorder, ValidatorSet,
};

use crate::chains::{ChainReader, ConsensusContract};
use crate::config::RelayerSettings;
use crate::events::{EventBus, RelayerEvent};
use crate::health::HealthMonitor;
use crate::submission::SubmissionClient;
use crate::watchers::{HomeWatcher, SecondaryWatcher, WatcherContext};

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Trinity 2-of-3 consensus proof relayer.
pub struct TrinityRelayer {
    contract: Arc<dyn ConsensusContract>,
    readers: BTreeMap<ChainRole, Arc<dyn ChainReader>>,
    validators: ValidatorSet,
    settings: RelayerSettings,
    registry: Arc<OperationRegistry>,
    nonces: Arc<NonceManager>,
    stats: Arc<StatsRecorder>,
    proofs: Arc<ProofGenerator>,
    submissions: Arc<SubmissionClient>,
    events: EventBus,
    tracker: TaskTracker,
    running: Mutex<Option<Running>>,
}

impl TrinityRelayer {
    /// Wire the relayer.
    ///
    /// Fails if a chain role has no validator or a secondary chain has no reader.
    pub fn new(
        contract: Arc<dyn ConsensusContract>,
        readers: Vec<Arc<dyn ChainReader>>,
        validators: ValidatorSet,
        store: RelayerStore,
        settings: RelayerSettings,
    ) -> Result<Self, RelayError> {
        let missing = validators.missing_roles();
        if !missing.is_empty() {
            return Err(RelayError::Config(format!(
                "no validator signing key for {:?}",
                missing
            )));
        }

        let mut by_role = BTreeMap::new();
        for reader in readers {
            let role = reader.role();
            if role.is_home() {
                return Err(RelayError::Config(
                    "the home chain is read through the consensus contract".into(),
                ));
            }
            if by_role.insert(role, reader).is_some() {
                return Err(RelayError::Config(format!("duplicate reader for {}", role)));
            }
        }
        for role in ChainRole::ALL.into_iter().filter(|role| !role.is_home()) {
            if !by_role.contains_key(&role) {
                return Err(RelayError::Config(format!("no chain reader for {}", role)));
            }
        }

        let registry = Arc::new(OperationRegistry::new(store.clone()));
        let nonces = Arc::new(NonceManager::new(store));
        let stats = Arc::new(StatsRecorder::new());
        let events = EventBus::new();
        let proofs = Arc::new(ProofGenerator::new(nonces.clone(), validators.clone()));
        let submissions = Arc::new(SubmissionClient::new(
            contract.clone(),
            settings.gas_limit,
            registry.clone(),
            stats.clone(),
            events.clone(),
        ));

        Ok(Self {
            contract,
            readers: by_role,
            validators,
            settings,
            registry,
            nonces,
            stats,
            proofs,
            submissions,
            events,
            tracker: TaskTracker::new(),
            running: Mutex::new(None),
        })
    }

    /// Start all watchers. Starting a running relayer is a no-op.
    pub async fn start(&self) -> Result<(), RelayError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Relayer already running");
            return Ok(());
        }

        self.registry.restore()?;
        self.seed_nonces().await?;

        let cancel = CancellationToken::new();
        let ctx = self.context(cancel.clone());
        let reconciled = ctx.reconcile_pending().await;

        self.stats.mark_started();
        self.tracker.reopen();

        let mut handles = Vec::with_capacity(2 + self.readers.len());
        handles.push(tokio::spawn(
            HomeWatcher::new(ctx.clone(), self.settings.home_retry_interval).run(),
        ));
        for (role, reader) in &self.readers {
            let watcher =
                SecondaryWatcher::new(ctx.clone(), reader.clone(), self.settings.poll_interval(*role));
            handles.push(tokio::spawn(watcher.run()));
        }
        handles.push(tokio::spawn(
            HealthMonitor::new(
                self.stats.clone(),
                self.registry.clone(),
                self.settings.health_interval,
                cancel.clone(),
            )
            .run(),
        ));

        *running = Some(Running { cancel, handles });

        let validators = self.validators.addresses();
        info!(
            validators = ?validators,
            pending = self.registry.pending_operations().len(),
            reconciled,
            "Trinity relayer started"
        );
        self.events.emit(RelayerEvent::Started { validators });
        Ok(())
    }

    /// Stop watchers and timers. In-flight submissions are not aborted.
    pub async fn stop(&self) {
        let Some(Running { cancel, handles }) = self.running.lock().await.take() else {
            return;
        };

        info!("Stopping Trinity relayer");
        cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Watcher task ended abnormally");
            }
        }
        self.tracker.close();

        if let Err(e) = self.registry.flush() {
            warn!(error = %e, "Failed to flush relayer store");
        }

        info!(in_flight = self.tracker.len(), "Trinity relayer stopped");
        self.events.emit(RelayerEvent::Stopped {
            reason: "stop requested".into(),
        });
    }

    /// Wait for in-flight submissions to finish, then flush what they recorded.
    /// Returns immediately if none are running.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;

        if let Err(e) = self.registry.flush() {
            warn!(error = %e, "Failed to flush relayer store");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn stats(&self) -> RelayerStats {
        self.stats.snapshot()
    }

    /// Operations still waiting for the verifier's consensus signal.
    ///
    /// Operations that reached consensus or were executed are left out; see
    /// [`TrinityRelayer::operations`] for the full set.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.registry.pending_operations()
    }

    /// Every operation the relayer tracks, including settled ones.
    pub fn operations(&self) -> Vec<Operation> {
        self.registry.operations()
    }

    /// Local view of one operation.
    pub fn operation(&self, operation_id: &OperationId) -> Option<Operation> {
        self.registry.get(operation_id)
    }

    /// Query the verifier for an operation's status and per-chain approvals.
    pub async fn check_consensus_status(&self, operation_id: &OperationId) -> Result<ConsensusStatus, RelayError> {
        let info = self.contract.operation_status(operation_id).await?;
        let approvals = try_join_all(ChainRole::ALL.into_iter().map(|chain| async move {
            self.contract
                .has_chain_approved(operation_id, chain)
                .await
                .map(|approved| (chain, approved))
        }))
        .await?;

        Ok(ConsensusStatus {
            status: info.status,
            approval_count: info.approval_count,
            created_at: info.created_at,
            chain_approvals: approvals.into_iter().collect(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayerEvent> {
        self.events.subscribe()
    }

    /// Seed every role from the verifier's nonce for its validator.
    ///
    /// Roles sharing a validator share one query. If the verifier cannot be
    /// reached the persisted counters are used.
    async fn seed_nonces(&self) -> Result<(), RelayError> {
        let mut roles_by_address: BTreeMap<Address, Vec<ChainRole>> = BTreeMap::new();
        for (role, address) in self.validators.addresses() {
            roles_by_address.entry(address).or_default().push(role);
        }

        for (address, roles) in roles_by_address {
            match self.contract.validator_nonce(address).await {
                Ok(on_chain) => {
                    for role in &roles {
                        let next = self.nonces.seed(*role, on_chain)?;
                        info!(chain = %role, validator = ?address, on_chain, next, "Nonce initialized");
                    }
                }
                Err(e) => {
                    warn!(
                        validator = ?address,
                        error = %e,
                        "Could not fetch validator nonce, resuming from store"
                    );
                    for role in &roles {
                        let next = self.nonces.seed_from_store(*role)?;
                        info!(chain = %role, validator = ?address, next, "Nonce initialized from store");
                    }
                }
            }
        }
        Ok(())
    }

    fn context(&self, cancel: CancellationToken) -> WatcherContext {
        WatcherContext {
            registry: self.registry.clone(),
            proofs: self.proofs.clone(),
            submissions: self.submissions.clone(),
            contract: self.contract.clone(),
            stats: self.stats.clone(),
            events: self.events.clone(),
            cancel,
            tracker: self.tracker.clone(),
        }
    }
}
