//! JSON-RPC client for the ledger node and the signing executor.
//!
//! Reads go to the node (`rpc_url`). Batches go to the executor (`executor_url`),
//! which holds the keys, signs the batch for the sender and forwards it. The
//! two may be the same endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ExecutionReceipt, LedgerService, ServiceError, TransactionPage, TransactionQuery};
use crate::config::Config;
use crate::models::{Address, ObjectId};
use crate::plan::OperationSequence;

pub const METHOD_GET_OBJECT: &str = "sui_getObject";
pub const METHOD_QUERY_TRANSACTIONS: &str = "suix_queryTransactionBlocks";
pub const METHOD_EXECUTE_BATCH: &str = "universe_executeBatch";

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP client speaking JSON-RPC 2.0.
#[derive(Debug)]
pub struct RpcClient {
    rpc_url: String,
    executor_url: String,
    api_key: Option<String>,
    client: Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rpc_url.clone(),
            config.executor_url(),
            config.api_key.clone(),
        )
    }

    /// Create with explicit configuration.
    pub fn new(
        rpc_url: impl Into<String>,
        executor_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            executor_url: executor_url.into(),
            api_key,
            client: Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Post one JSON-RPC call and unwrap its envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<T, ServiceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut req = self.client.post(url).json(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        tracing::debug!(method, id, "RPC request");
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcEnvelope<T> = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(err) = envelope.error {
            return Err(ServiceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope.result.ok_or_else(|| ServiceError::Rpc {
            code: -32603,
            message: format!("{} returned neither result nor error", method),
        })
    }
}

#[async_trait]
impl LedgerService for RpcClient {
    async fn execute(
        &self,
        sender: &Address,
        sequence: &OperationSequence,
    ) -> Result<ExecutionReceipt, ServiceError> {
        self.call(
            &self.executor_url,
            METHOD_EXECUTE_BATCH,
            json!([sender, sequence]),
        )
        .await
    }

    async fn get_object(&self, id: &ObjectId) -> Result<Value, ServiceError> {
        self.call(
            &self.rpc_url,
            METHOD_GET_OBJECT,
            json!([id, { "showContent": true, "showType": true }]),
        )
        .await
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ServiceError> {
        self.call(
            &self.rpc_url,
            METHOD_QUERY_TRANSACTIONS,
            json!([
                {
                    "filter": { "FromAddress": query.sender },
                    "options": {
                        "showInput": true,
                        "showEffects": true,
                        "showObjectChanges": true
                    }
                },
                query.cursor,
                query.limit,
                false
            ]),
        )
        .await
    }
}
