//! Arbitrum client for the TrinityConsensusVerifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::{ContractError, LogMeta};
use ethers::prelude::*;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use trinity_core::{
    BlockReference, ChainRole, CrossChainProof, OperationId, OperationStatus, OperationStatusInfo,
    RelayError,
};

use super::{ConsensusContract, ContractEvent};

abigen!(
    TrinityConsensusVerifier,
    r#"[
        event OperationCreated(bytes32 indexed operationId, address indexed initiator, uint8 operationType, uint256 amount)
        event ProofSubmitted(bytes32 indexed operationId, uint8 indexed chainId, address validator)
        event ConsensusReached(bytes32 indexed operationId, uint8 approvalCount)
        event OperationExecuted(bytes32 indexed operationId, bool success)
        function submitChainProof(bytes32 operationId, uint8 chainId, bytes32 merkleRoot, bytes32[] merkleProof, bytes validatorSignature, uint256 nonce)
        function getOperationStatus(bytes32 operationId) view returns (uint8 status, uint8 approvalCount, uint256 createdAt)
        function hasChainApproved(bytes32 operationId, uint8 chainId) view returns (bool)
        function getValidatorNonce(address validator) view returns (uint256)
    ]"#
);

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Event buffer between the log stream and the home watcher.
const EVENT_BUFFER: usize = 1000;
/// Log polling interval for HTTP filter streams.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// HTTP client for calls and transactions, optionally paired with a websocket
/// endpoint for push event delivery.
pub struct ArbitrumClient {
    provider: Provider<Http>,
    contract: TrinityConsensusVerifier<SignerClient>,
    verifier: Address,
    ws_url: Option<String>,
}

impl ArbitrumClient {
    /// Connect to `rpc_url`; the wallet's chain id is taken from the node.
    pub async fn connect(
        rpc_url: &str,
        ws_url: Option<String>,
        verifier: Address,
        wallet: LocalWallet,
    ) -> Result<Self, RelayError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| RelayError::Config(format!("invalid Arbitrum RPC URL: {}", e)))?
            .interval(POLL_INTERVAL);

        let client = SignerMiddleware::new_with_provider_chain(provider.clone(), wallet)
            .await
            .map_err(|e| RelayError::rpc(ChainRole::Arbitrum, e))?;

        info!(
            verifier = ?verifier,
            sender = ?client.address(),
            chain_id = client.signer().chain_id(),
            push_events = ws_url.is_some(),
            "Arbitrum client connected"
        );

        Ok(Self {
            provider,
            contract: TrinityConsensusVerifier::new(verifier, Arc::new(client)),
            verifier,
            ws_url,
        })
    }

    /// Start the log task for the configured transport and wait until it is listening.
    async fn spawn_event_task(
        &self,
        from_block: Option<u64>,
        tx: mpsc::Sender<ContractEvent>,
    ) -> Result<(), RelayError> {
        let (ready_tx, ready_rx) = oneshot::channel();

        match &self.ws_url {
            Some(url) => {
                let ws = Provider::<Ws>::connect(url.as_str())
                    .await
                    .map_err(|e| RelayError::rpc(ChainRole::Arbitrum, format!("websocket connect failed: {}", e)))?;
                let contract = TrinityConsensusVerifier::new(self.verifier, Arc::new(ws));
                tokio::spawn(async move {
                    let events = scoped(contract.events(), from_block);
                    backfill(&events, from_block, &tx).await;
                    let subscribed = events.subscribe_with_meta().await;
                    match subscribed {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            pump(stream, tx).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(classify(e)));
                        }
                    };
                });
            }
            None => {
                let contract = self.contract.clone();
                tokio::spawn(async move {
                    let events = scoped(contract.events(), from_block);
                    backfill(&events, from_block, &tx).await;
                    let subscribed = events.stream_with_meta().await;
                    match subscribed {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            pump(stream, tx).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(classify(e)));
                        }
                    };
                });
            }
        }

        ready_rx
            .await
            .map_err(|_| RelayError::rpc(ChainRole::Arbitrum, "event task ended before subscribing"))?
    }
}

#[async_trait]
impl ConsensusContract for ArbitrumClient {
    async fn subscribe(&self, from_block: Option<u64>) -> Result<mpsc::Receiver<ContractEvent>, RelayError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.spawn_event_task(from_block, tx).await?;
        debug!(from_block = ?from_block, "Subscribed to verifier events");
        Ok(rx)
    }

    async fn head_block(&self) -> Result<u64, RelayError> {
        self.provider
            .get_block_number()
            .await
            .map(|number| number.as_u64())
            .map_err(|e| RelayError::rpc(ChainRole::Arbitrum, e))
    }

    async fn block_reference(&self, block_number: u64) -> Result<BlockReference, RelayError> {
        let block = self
            .provider
            .get_block(block_number)
            .await
            .map_err(|e| RelayError::rpc(ChainRole::Arbitrum, e))?
            .ok_or_else(|| RelayError::rpc(ChainRole::Arbitrum, format!("block {} not found", block_number)))?;

        let hash = block
            .hash
            .ok_or_else(|| RelayError::rpc(ChainRole::Arbitrum, format!("block {} is pending", block_number)))?;

        Ok(BlockReference {
            hash: format!("{:?}", hash),
            number: block_number,
            timestamp: saturating_u64(block.timestamp),
        })
    }

    async fn validator_nonce(&self, validator: Address) -> Result<u64, RelayError> {
        let nonce = self
            .contract
            .get_validator_nonce(validator)
            .call()
            .await
            .map_err(classify)?;

        if nonce > U256::from(u64::MAX) {
            return Err(RelayError::InvalidInput(format!(
                "validator nonce {} does not fit in u64",
                nonce
            )));
        }
        Ok(nonce.as_u64())
    }

    async fn submit_chain_proof(&self, proof: &CrossChainProof, gas_limit: u64) -> Result<H256, RelayError> {
        let call = self
            .contract
            .submit_chain_proof(
                proof.operation_id.to_fixed_bytes(),
                proof.chain_id(),
                proof.merkle_root.to_fixed_bytes(),
                proof.merkle_proof.iter().map(|node| node.to_fixed_bytes()).collect(),
                proof.validator_signature.clone(),
                U256::from(proof.nonce),
            )
            .gas(gas_limit);

        // With a fixed gas ceiling nothing estimates before broadcast, so
        // simulate first to surface the revert reason.
        call.call().await.map_err(classify)?;

        let pending = call.send().await.map_err(classify)?;
        let tx_hash = pending.tx_hash();
        debug!(
            operation_id = %proof.operation_id,
            chain = %proof.chain,
            tx_hash = ?tx_hash,
            "Proof transaction sent"
        );

        let receipt = pending
            .await
            .map_err(|e| RelayError::rpc(ChainRole::Arbitrum, e))?
            .ok_or_else(|| RelayError::Dropped(format!("{:?}", tx_hash)))?;

        if receipt.status != Some(U64::from(1)) {
            return Err(RelayError::Reverted(format!(
                "transaction {:?} reverted in block {:?}",
                tx_hash, receipt.block_number
            )));
        }

        Ok(receipt.transaction_hash)
    }

    async fn operation_status(&self, operation_id: &OperationId) -> Result<OperationStatusInfo, RelayError> {
        let (status, approval_count, created_at) = self
            .contract
            .get_operation_status(operation_id.to_fixed_bytes())
            .call()
            .await
            .map_err(classify)?;

        Ok(OperationStatusInfo {
            status: OperationStatus::from_code(status),
            approval_count,
            created_at: saturating_u64(created_at),
        })
    }

    async fn has_chain_approved(&self, operation_id: &OperationId, chain: ChainRole) -> Result<bool, RelayError> {
        self.contract
            .has_chain_approved(operation_id.to_fixed_bytes(), chain.chain_id())
            .call()
            .await
            .map_err(classify)
    }
}

fn scoped<M: Middleware>(
    events: ethers::contract::builders::Event<Arc<M>, M, TrinityConsensusVerifierEvents>,
    from_block: Option<u64>,
) -> ethers::contract::builders::Event<Arc<M>, M, TrinityConsensusVerifierEvents> {
    match from_block {
        Some(block) => events.from_block(block),
        None => events,
    }
}

/// Replay logs from `from_block` to head. Live filters only report new logs.
async fn backfill<M: Middleware>(
    events: &ethers::contract::builders::Event<Arc<M>, M, TrinityConsensusVerifierEvents>,
    from_block: Option<u64>,
    tx: &mpsc::Sender<ContractEvent>,
) {
    let Some(from_block) = from_block else {
        return;
    };

    match events.query_with_meta().await {
        Ok(logs) => {
            debug!(from_block, count = logs.len(), "Replaying verifier events");
            for (event, meta) in logs {
                if let Some(event) = convert(event, &meta) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
        Err(e) => warn!(from_block, error = %e, "Verifier event backfill failed"),
    }
}

/// Forward decoded events until the stream ends or the receiver goes away.
async fn pump<S, E>(stream: S, tx: mpsc::Sender<ContractEvent>)
where
    S: Stream<Item = Result<(TrinityConsensusVerifierEvents, LogMeta), E>>,
    E: std::fmt::Display,
{
    futures::pin_mut!(stream);
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            item = stream.next() => match item {
                Some(Ok((event, meta))) => {
                    if let Some(event) = convert(event, &meta) {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Undecodable verifier log"),
                None => {
                    warn!("Verifier event stream ended");
                    break;
                }
            }
        }
    }
}

fn convert(event: TrinityConsensusVerifierEvents, meta: &LogMeta) -> Option<ContractEvent> {
    match event {
        TrinityConsensusVerifierEvents::OperationCreatedFilter(e) => Some(ContractEvent::OperationCreated {
            operation_id: H256::from(e.operation_id),
            initiator: e.initiator,
            operation_type: e.operation_type,
            amount: e.amount,
            block_number: meta.block_number.as_u64(),
        }),
        TrinityConsensusVerifierEvents::ConsensusReachedFilter(e) => Some(ContractEvent::ConsensusReached {
            operation_id: H256::from(e.operation_id),
            approval_count: e.approval_count,
        }),
        TrinityConsensusVerifierEvents::OperationExecutedFilter(e) => Some(ContractEvent::OperationExecuted {
            operation_id: H256::from(e.operation_id),
            success: e.success,
        }),
        TrinityConsensusVerifierEvents::ProofSubmittedFilter(_) => None,
    }
}

/// Decoded revert reasons become [`RelayError::Reverted`]; everything else is
/// an RPC failure (whose message may still carry the node's revert text).
fn classify<M: Middleware>(err: ContractError<M>) -> RelayError {
    if let Some(reason) = err.decode_revert::<String>() {
        return RelayError::Reverted(reason);
    }
    if err.is_revert() {
        return RelayError::Reverted(err.to_string());
    }
    RelayError::rpc(ChainRole::Arbitrum, err)
}

fn saturating_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}
