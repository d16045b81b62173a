//! Minimal JSON-RPC 2.0 client shared by the Solana and TON readers.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use trinity_core::{ChainRole, RelayError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC client bound to one chain endpoint.
#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    chain: ChainRole,
    url: String,
    client: Client,
}

impl JsonRpcClient {
    pub fn new(chain: ChainRole, url: impl Into<String>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            chain,
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call, returning the `result` member.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });
        trace!(chain = %self.chain, method, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::rpc(self.chain, format!("{} request failed: {}", method, e)))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RelayError::rpc(self.chain, format!("{} response unreadable: {}", method, e)))?;

        body.into_result(self.chain, method)
    }
}

/// JSON-RPC response envelope.
///
/// toncenter answers with `{ok, result, error}` rather than a JSON-RPC error
/// object on failure, so both shapes are accepted.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    result: Option<Value>,
    error: Option<Value>,
    ok: Option<bool>,
}

impl RpcResponse {
    pub(crate) fn into_result(self, chain: ChainRole, method: &str) -> Result<Value, RelayError> {
        if let Some(error) = self.error {
            let message = match &error {
                Value::Object(object) => {
                    let code = object.get("code").and_then(Value::as_i64).unwrap_or_default();
                    let text = object.get("message").and_then(Value::as_str).unwrap_or("unknown error");
                    format!("{} - {}", code, text)
                }
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Err(RelayError::rpc(chain, format!("{}: {}", method, message)));
        }

        if self.ok == Some(false) {
            return Err(RelayError::rpc(chain, format!("{}: endpoint reported failure", method)));
        }

        self.result
            .filter(|result| !result.is_null())
            .ok_or_else(|| RelayError::rpc(chain, format!("{}: empty result", method)))
    }
}
