//! Boundary to the execution and query service.
//!
//! [`LedgerService`] is the only way this crate touches ledger state. Two
//! implementations ship with the crate:
//! - [`RpcClient`]: JSON-RPC over HTTP against a node and a signing executor.
//! - [`MemoryLedger`]: in-process ledger with the same all-or-nothing semantics,
//!   backing the tests and the local devnet.
//!
//! Object content is returned as raw JSON on purpose. Turning it into entity
//! models is the job of [`crate::reconstruct`] alone.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Address, ObjectId};
use crate::plan::OperationSequence;

pub use client::RpcClient;
pub use memory::MemoryLedger;

/// Failures reported by the execution or query service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Batch rejected: {0}")]
    Rejected(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Execution and query service.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Execute a batch as one atomic unit on behalf of `sender`.
    ///
    /// Either every operation lands or none does.
    async fn execute(
        &self,
        sender: &Address,
        sequence: &OperationSequence,
    ) -> Result<ExecutionReceipt, ServiceError>;

    /// Fetch an object's current content in the service's native, field-wrapped shape.
    ///
    /// A missing object is not an error here; the response says so in-band.
    async fn get_object(&self, id: &ObjectId) -> Result<Value, ServiceError>;

    /// One page of transactions originated by `query.sender`, oldest first.
    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ServiceError>;
}

// ============================================================
// Execution
// ============================================================

/// Opaque confirmation of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub digest: String,
    #[serde(default)]
    pub timestamp_ms: Option<String>,
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

impl ExecutionReceipt {
    /// Ids of objects of exactly `object_type` created by the batch.
    pub fn created_of_type<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a ObjectId> {
        created_of_type(&self.object_changes, object_type)
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp_ms.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Mutated,
    Wrapped,
    Deleted,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(alias = "packageId")]
    pub object_id: ObjectId,
    #[serde(default)]
    pub object_type: Option<String>,
}

impl ObjectChange {
    pub fn created(object_id: ObjectId, object_type: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Created,
            object_id,
            object_type: Some(object_type.into()),
        }
    }
}

fn created_of_type<'a>(
    changes: &'a [ObjectChange],
    object_type: &'a str,
) -> impl Iterator<Item = &'a ObjectId> {
    changes
        .iter()
        .filter(move |c| {
            c.kind == ChangeKind::Created && c.object_type.as_deref() == Some(object_type)
        })
        .map(|c| &c.object_id)
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let millis = raw?.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

// ============================================================
// History
// ============================================================

/// Filter for the historical transaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub sender: Address,
    /// Digest after which to continue; `None` starts from the oldest entry.
    pub cursor: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    #[serde(default)]
    pub data: Vec<TransactionBlock>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

/// A committed transaction as reported by the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlock {
    pub digest: String,
    #[serde(default)]
    pub timestamp_ms: Option<String>,
    #[serde(default)]
    pub transaction: Option<TransactionEnvelope>,
    #[serde(default)]
    pub effects: Option<TransactionEffects>,
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

impl TransactionBlock {
    /// Move calls in the transaction's command list, in order.
    pub fn move_calls(&self) -> impl Iterator<Item = &MoveCallRecord> {
        self.transaction
            .iter()
            .filter(|t| t.data.transaction.kind == PROGRAMMABLE_TRANSACTION)
            .flat_map(|t| t.data.transaction.transactions.iter())
            .filter_map(|c| c.move_call.as_ref())
    }

    /// Ids of objects the effects report as newly created.
    pub fn created_ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.effects
            .iter()
            .flat_map(|e| e.created.iter())
            .map(|r| &r.reference.object_id)
    }

    /// The object type the change list reports for `id`, if any.
    pub fn object_type_of(&self, id: &ObjectId) -> Option<&str> {
        self.object_changes
            .iter()
            .find(|c| &c.object_id == id)
            .and_then(|c| c.object_type.as_deref())
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp_ms.as_deref())
    }
}

pub const PROGRAMMABLE_TRANSACTION: &str = "ProgrammableTransaction";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub data: TransactionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub sender: Address,
    pub transaction: TransactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionKind {
    pub kind: String,
    #[serde(default)]
    pub transactions: Vec<Command>,
}

/// One command of a programmable transaction. Commands other than move calls
/// deserialize with `move_call` unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "MoveCall", default, skip_serializing_if = "Option::is_none")]
    pub move_call: Option<MoveCallRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCallRecord {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub created: Vec<OwnedObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedObjectRef {
    pub reference: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub object_id: ObjectId,
    pub version: u64,
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_node_shaped_transaction_block() {
        let block: TransactionBlock = serde_json::from_value(serde_json::json!({
            "digest": "D1",
            "timestampMs": "1700000000000",
            "transaction": {
                "data": {
                    "sender": "0x1",
                    "transaction": {
                        "kind": "ProgrammableTransaction",
                        "inputs": [],
                        "transactions": [
                            {"SplitCoins": ["GasCoin", [{"Input": 0}]]},
                            {"MoveCall": {"package": "0x2a", "module": "universe", "function": "create_universe"}}
                        ]
                    }
                }
            },
            "effects": {
                "status": {"status": "success"},
                "created": [{"owner": "Shared", "reference": {"objectId": "0x9", "version": 3, "digest": "x"}}]
            },
            "objectChanges": [
                {"type": "created", "objectId": "0x9", "objectType": "0x2a::universe::Universe"},
                {"type": "published", "packageId": "0x8"}
            ]
        }))
        .unwrap();

        let calls: Vec<_> = block.move_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "create_universe");
        assert_eq!(calls[0].package, ObjectId::from_u128(0x2a));

        let created: Vec<_> = block.created_ids().collect();
        assert_eq!(created, vec![&ObjectId::from_u128(9)]);
        assert_eq!(block.object_changes[1].kind, ChangeKind::Other);
        assert_eq!(
            block.committed_at().unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn non_programmable_transactions_have_no_move_calls() {
        let block: TransactionBlock = serde_json::from_value(serde_json::json!({
            "digest": "D2",
            "transaction": {
                "data": {
                    "sender": "0x1",
                    "transaction": {"kind": "ChangeEpoch"}
                }
            }
        }))
        .unwrap();

        assert_eq!(block.move_calls().count(), 0);
        assert_eq!(block.created_ids().count(), 0);
    }

    #[test]
    fn receipt_filters_created_by_type() {
        let receipt = ExecutionReceipt {
            digest: "D".to_string(),
            timestamp_ms: None,
            object_changes: vec![
                ObjectChange::created(ObjectId::from_u128(1), "T::Universe"),
                ObjectChange::created(ObjectId::from_u128(2), "T::Galaxy"),
                ObjectChange {
                    kind: ChangeKind::Mutated,
                    object_id: ObjectId::from_u128(3),
                    object_type: Some("T::Universe".to_string()),
                },
            ],
        };

        let ids: Vec<_> = receipt.created_of_type("T::Universe").collect();
        assert_eq!(ids, vec![&ObjectId::from_u128(1)]);
    }
}
