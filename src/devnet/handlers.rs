use std::sync::Arc;

use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ledger::client::{METHOD_EXECUTE_BATCH, METHOD_GET_OBJECT, METHOD_QUERY_TRANSACTIONS};
use crate::ledger::{LedgerService, ServiceError, TransactionQuery};
use crate::models::{Address, ObjectId};
use crate::plan::OperationSequence;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

const DEFAULT_QUERY_LIMIT: usize = 50;

type Ledger = Arc<dyn LedgerService>;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug)]
struct RpcFailure {
    code: i64,
    message: String,
}

impl RpcFailure {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for RpcFailure {
    fn from(e: ServiceError) -> Self {
        tracing::warn!(error = %e, "Ledger call failed");
        Self::new(SERVER_ERROR, e.to_string())
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ============================================================
// JSON-RPC
// ============================================================

/// Single JSON-RPC 2.0 endpoint. Protocol errors are reported in-band with HTTP 200.
pub async fn rpc(State(ledger): State<Ledger>, body: Bytes) -> Json<Value> {
    let request: RpcRequest = match serde_json::from_slice::<Value>(&body) {
        Err(e) => return reply(Value::Null, Err(RpcFailure::new(PARSE_ERROR, e.to_string()))),
        Ok(value) => match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return reply(
                    Value::Null,
                    Err(RpcFailure::new(INVALID_REQUEST, e.to_string())),
                )
            }
        },
    };

    tracing::debug!(method = %request.method, "Devnet RPC");
    let outcome = dispatch(&ledger, &request.method, &request.params).await;
    reply(request.id, outcome)
}

async fn dispatch(ledger: &Ledger, method: &str, params: &Value) -> Result<Value, RpcFailure> {
    match method {
        METHOD_GET_OBJECT => {
            let id: ObjectId = param(params, 0)?;
            Ok(ledger.get_object(&id).await?)
        }
        METHOD_QUERY_TRANSACTIONS => {
            let query = transaction_query(params)?;
            let page = ledger.query_transactions(&query).await?;
            to_value(page)
        }
        METHOD_EXECUTE_BATCH => {
            let sender: Address = param(params, 0)?;
            let sequence: OperationSequence = param(params, 1)?;
            let receipt = ledger.execute(&sender, &sequence).await?;
            to_value(receipt)
        }
        other => Err(RpcFailure::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    }
}

fn transaction_query(params: &Value) -> Result<TransactionQuery, RpcFailure> {
    let sender: Address = params
        .get(0)
        .and_then(|q| q.get("filter"))
        .and_then(|f| f.get("FromAddress"))
        .cloned()
        .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, "Only FromAddress filters are supported"))
        .and_then(|raw| {
            serde_json::from_value(raw).map_err(|e| RpcFailure::new(INVALID_PARAMS, e.to_string()))
        })?;
    let cursor: Option<String> = optional_param(params, 1)?;
    let limit: Option<usize> = optional_param(params, 2)?;

    Ok(TransactionQuery {
        sender,
        cursor,
        limit: limit.unwrap_or(DEFAULT_QUERY_LIMIT),
    })
}

fn param<T: DeserializeOwned>(params: &Value, index: usize) -> Result<T, RpcFailure> {
    let raw = params
        .get(index)
        .cloned()
        .ok_or_else(|| RpcFailure::new(INVALID_PARAMS, format!("Missing parameter {}", index)))?;
    serde_json::from_value(raw)
        .map_err(|e| RpcFailure::new(INVALID_PARAMS, format!("Parameter {}: {}", index, e)))
}

fn optional_param<T: DeserializeOwned>(
    params: &Value,
    index: usize,
) -> Result<Option<T>, RpcFailure> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => param(params, index).map(Some),
    }
}

fn to_value(value: impl serde::Serialize) -> Result<Value, RpcFailure> {
    serde_json::to_value(value).map_err(|e| RpcFailure::new(SERVER_ERROR, e.to_string()))
}

fn reply(id: Value, outcome: Result<Value, RpcFailure>) -> Json<Value> {
    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(failure) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": failure.code, "message": failure.message }
        }),
    })
}
