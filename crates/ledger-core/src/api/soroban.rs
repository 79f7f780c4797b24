//! JSON-RPC implementation of [`LedgerGateway`].

use super::{ContractCall, LedgerGateway, SubmitAck, TxPoll};
use crate::config::LedgerConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Gateway speaking JSON-RPC 2.0 to a Soroban-style RPC node.
pub struct SorobanGateway {
    rpc_url: String,
    http_client: reqwest::Client,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetTransactionResult {
    status: String,
    #[serde(default, rename = "returnValue")]
    return_value: Option<serde_json::Value>,
    #[serde(default, rename = "resultXdr")]
    result_detail: Option<String>,
}

impl SorobanGateway {
    pub fn new(config: &LedgerConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            rpc_url: config.rpc_url.clone(),
            http_client,
            request_id: AtomicU64::new(1),
        }
    }

    /// Issue one JSON-RPC request. Transport failures surface as
    /// `Error::Http`; ledger-side errors as `Error::Rpc`.
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "ledger rpc request");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(Error::Rpc {
                message: format!("{} (code {})", err.message, err.code),
            });
        }
        body.result.ok_or_else(|| Error::Rpc {
            message: format!("{}: response missing result", method),
        })
    }
}

#[async_trait]
impl LedgerGateway for SorobanGateway {
    async fn simulate(&self, call: &ContractCall) -> Result<serde_json::Value> {
        let result = self
            .call("simulateTransaction", json!({ "call": call }))
            .await?;
        Ok(result
            .get("returnValue")
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn submit(&self, envelope_b64: &str) -> Result<SubmitAck> {
        let result = self
            .call("sendTransaction", json!({ "transaction": envelope_b64 }))
            .await?;
        serde_json::from_value(result).map_err(|e| Error::Rpc {
            message: format!("malformed sendTransaction response: {}", e),
        })
    }

    async fn poll(&self, hash: &str) -> Result<TxPoll> {
        let result = self
            .call("getTransaction", json!({ "hash": hash }))
            .await?;
        let parsed: GetTransactionResult =
            serde_json::from_value(result).map_err(|e| Error::Rpc {
                message: format!("malformed getTransaction response: {}", e),
            })?;

        match parsed.status.as_str() {
            "SUCCESS" => Ok(TxPoll::Success(
                parsed.return_value.unwrap_or(serde_json::Value::Null),
            )),
            "FAILED" => Ok(TxPoll::Failed(
                parsed
                    .result_detail
                    .unwrap_or_else(|| "ledger reported FAILED".to_string()),
            )),
            "NOT_FOUND" => Ok(TxPoll::NotFound),
            other => Err(Error::Rpc {
                message: format!("unknown transaction status: {}", other),
            }),
        }
    }

    async fn build_unsigned(&self, call: &ContractCall, source_account: &str) -> Result<String> {
        let result = self
            .call(
                "buildTransaction",
                json!({ "call": call, "sourceAccount": source_account }),
            )
            .await?;
        result
            .get("transaction")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Rpc {
                message: "buildTransaction response missing transaction".to_string(),
            })
    }
}
