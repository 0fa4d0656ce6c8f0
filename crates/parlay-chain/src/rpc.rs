//! json-rpc 2.0 client for the settlement chain

use crate::error::{ChainError, Result};
use alloy_primitives::{Address, Bytes, B256, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RpcClient {
    url: String,
    http: Client,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(Self { url: url.to_string(), http })
    }

    pub async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "parlay",
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout(method.to_string())
                } else {
                    ChainError::Rpc(e.to_string())
                }
            })?;

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(ChainError::Rpc(format!("{} ({})", error.message, error.code)));
        }

        // a null result is legitimate (pending receipts); option targets
        // absorb it, everything else fails decode with context
        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| ChainError::Decode(format!("{method}: {e}")))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: U256 = self.call("eth_chainId", vec![]).await?;
        Ok(raw.to::<u64>())
    }

    /// pending-state nonce for the local signer
    pub async fn transaction_count(&self, addr: Address) -> Result<u64> {
        let raw: U256 = self
            .call("eth_getTransactionCount", vec![json!(addr), json!("pending")])
            .await?;
        Ok(raw.to::<u64>())
    }

    pub async fn gas_price(&self) -> Result<U256> {
        self.call("eth_gasPrice", vec![]).await
    }

    pub async fn eth_call(&self, to: Address, data: &Bytes) -> Result<Bytes> {
        self.call(
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!("latest")],
        )
        .await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        self.call(
            "eth_sendRawTransaction",
            vec![json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
    }

    pub async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)]).await
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// the receipt fields the agent actually reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub status: U256,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == U256::from(1u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_status_parses_from_quantity() {
        let raw = json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "status": "0x1",
            "logs": [{
                "address": "0x2222222222222222222222222222222222222222",
                "topics": ["0x3333333333333333333333333333333333333333333333333333333333333333"],
                "data": "0x"
            }]
        });
        let receipt: TxReceipt = serde_json::from_value(raw).unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.logs.len(), 1);
    }

    #[test]
    fn reverted_receipt() {
        let raw = json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "status": "0x0",
            "logs": []
        });
        let receipt: TxReceipt = serde_json::from_value(raw).unwrap();
        assert!(!receipt.succeeded());
    }
}
