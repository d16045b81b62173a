//! TON masterchain reader.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde_json::{json, Value};

use trinity_core::{unix_timestamp, BlockReference, ChainRole, RelayError};

use super::{ChainReader, JsonRpcClient};

/// Reads the last masterchain block from a toncenter JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct TonReader {
    rpc: JsonRpcClient,
}

impl TonReader {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RelayError> {
        Ok(Self {
            rpc: JsonRpcClient::new(ChainRole::Ton, endpoint)?,
        })
    }
}

#[async_trait]
impl ChainReader for TonReader {
    fn role(&self) -> ChainRole {
        ChainRole::Ton
    }

    async fn latest_reference(&self) -> Result<BlockReference, RelayError> {
        let info = self.rpc.call("getMasterchainInfo", json!({})).await?;
        parse_masterchain_info(&info)
    }
}

/// `{last: {seqno, root_hash}}` into a reference with a `0x`-hex root hash.
///
/// toncenter does not report the block time here; the observation time is used.
fn parse_masterchain_info(info: &Value) -> Result<BlockReference, RelayError> {
    let last = &info["last"];
    let seqno = last["seqno"].as_u64().ok_or_else(|| {
        RelayError::rpc(ChainRole::Ton, format!("masterchain info without seqno: {}", info))
    })?;
    let root_hash = last["root_hash"].as_str().ok_or_else(|| {
        RelayError::rpc(ChainRole::Ton, format!("masterchain info without root_hash: {}", info))
    })?;

    let raw = STANDARD
        .decode(root_hash)
        .or_else(|_| URL_SAFE.decode(root_hash))
        .map_err(|e| RelayError::rpc(ChainRole::Ton, format!("root_hash is not base64: {}", e)))?;

    Ok(BlockReference {
        hash: format!("0x{}", hex::encode(raw)),
        number: seqno,
        timestamp: unix_timestamp(),
    })
}
