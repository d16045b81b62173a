//! Solana slot reader.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use trinity_core::{unix_timestamp, BlockReference, ChainRole, RelayError};

use super::{ChainReader, JsonRpcClient};

/// Reads the latest confirmed slot and blockhash over JSON-RPC.
#[derive(Clone, Debug)]
pub struct SolanaReader {
    rpc: JsonRpcClient,
}

impl SolanaReader {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, RelayError> {
        Ok(Self {
            rpc: JsonRpcClient::new(ChainRole::Solana, rpc_url)?,
        })
    }
}

#[async_trait]
impl ChainReader for SolanaReader {
    fn role(&self) -> ChainRole {
        ChainRole::Solana
    }

    async fn latest_reference(&self) -> Result<BlockReference, RelayError> {
        let commitment = json!([{ "commitment": "confirmed" }]);

        let slot = parse_slot(&self.rpc.call("getSlot", commitment.clone()).await?)?;
        let blockhash = parse_blockhash(&self.rpc.call("getLatestBlockhash", commitment).await?)?;

        // Block time is unavailable for skipped or very recent slots.
        let timestamp = match self.rpc.call("getBlockTime", json!([slot])).await {
            Ok(value) => value.as_u64().unwrap_or_else(unix_timestamp),
            Err(e) => {
                debug!(slot, error = %e, "Solana block time unavailable, using local time");
                unix_timestamp()
            }
        };

        Ok(BlockReference {
            hash: blockhash,
            number: slot,
            timestamp,
        })
    }
}

fn parse_slot(value: &Value) -> Result<u64, RelayError> {
    value
        .as_u64()
        .ok_or_else(|| RelayError::rpc(ChainRole::Solana, format!("unexpected getSlot result: {}", value)))
}

fn parse_blockhash(value: &Value) -> Result<String, RelayError> {
    value["value"]["blockhash"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            RelayError::rpc(
                ChainRole::Solana,
                format!("unexpected getLatestBlockhash result: {}", value),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slot() {
        assert_eq!(parse_slot(&json!(287_654_321u64)).unwrap(), 287_654_321);
        assert!(parse_slot(&json!("287654321")).is_err());
    }

    #[test]
    fn test_parse_blockhash() {
        let result = json!({
            "context": { "slot": 2792 },
            "value": {
                "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                "lastValidBlockHeight": 3090
            }
        });
        assert_eq!(
            parse_blockhash(&result).unwrap(),
            "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N"
        );
        assert!(parse_blockhash(&json!({ "value": {} })).is_err());
    }
}
