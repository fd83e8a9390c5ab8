//! Protobuf records persisted in the ledger or exchanged with other
//! chaincodes.
//!
//! These are hand-declared `prost` messages rather than build-script output:
//! the set is small, the field numbers are frozen by existing state, and
//! keeping them next to the code that reads them makes drift obvious. The
//! request messages also derive serde so the same type accepts canonical
//! JSON and binary protobuf.

use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::LedgerResult;

/// Encodes any message to bytes.
pub fn encode<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_to_vec()
}

/// Decodes bytes into a message.
pub fn decode<M: Message + Default>(bytes: &[u8]) -> LedgerResult<M> {
    Ok(M::decode(bytes)?)
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

/// Sender snapshot stored with a preimage.
#[derive(Clone, PartialEq, Message)]
pub struct SenderRecord {
    /// Raw 32-byte address.
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    /// ACL user id at enqueue time.
    #[prost(string, tag = "2")]
    pub user_id: String,
}

/// A queued transaction awaiting batch execution.
#[derive(Clone, PartialEq, Message)]
pub struct PendingTx {
    /// External method name.
    #[prost(string, tag = "1")]
    pub method: String,
    /// Authenticated sender; absent for `invoke-nbtx` methods.
    #[prost(message, optional, tag = "2")]
    pub sender: Option<SenderRecord>,
    /// Method arguments, signature material stripped.
    #[prost(string, repeated, tag = "3")]
    pub args: Vec<String>,
    /// Host timestamp of the enqueueing proposal, milliseconds.
    #[prost(int64, tag = "4")]
    pub timestamp_ms: i64,
    /// Nonce accepted at enqueue time (0 for unsigned methods).
    #[prost(uint64, tag = "5")]
    pub nonce: u64,
    /// Client request id from the envelope.
    #[prost(string, tag = "6")]
    pub request_id: String,
}

/// Nonce window for one sender, newest first.
#[derive(Clone, PartialEq, Message)]
pub struct NonceRecord {
    /// Accepted nonces sorted descending.
    #[prost(uint64, repeated, tag = "1")]
    pub nonces: Vec<u64>,
}

/// Inline task for `executeTasks`.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct Task {
    /// Task id, echoed in the response event.
    #[prost(string, tag = "1")]
    pub id: String,
    /// External method name.
    #[prost(string, tag = "2")]
    pub method: String,
    /// Full signed argument envelope minus the method name.
    #[prost(string, repeated, tag = "3")]
    #[serde(default)]
    pub args: Vec<String>,
}

/// Argument of `executeTasks`.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct ExecuteTasksRequest {
    /// Tasks in execution order.
    #[prost(message, repeated, tag = "1")]
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Argument of `batchExecute`.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Preimage ids in execution order.
    #[prost(string, repeated, tag = "1")]
    #[serde(default, rename = "txIds")]
    pub tx_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Token configuration
// ---------------------------------------------------------------------------

/// Transfer fee descriptor.
#[derive(Clone, PartialEq, Message)]
pub struct FeeRecord {
    /// Currency the fee is charged in.
    #[prost(string, tag = "1")]
    pub currency: String,
    /// Fee rate, fixed point 1e8.
    #[prost(bytes = "vec", tag = "2")]
    pub fee: Vec<u8>,
    /// Minimum fee.
    #[prost(bytes = "vec", tag = "3")]
    pub floor: Vec<u8>,
    /// Maximum fee (empty = uncapped).
    #[prost(bytes = "vec", tag = "4")]
    pub cap: Vec<u8>,
    /// Collector address.
    #[prost(bytes = "vec", tag = "5")]
    pub address: Vec<u8>,
}

/// Rate table entry.
#[derive(Clone, PartialEq, Message)]
pub struct RateRecord {
    /// Deal type (e.g. `buyToken`, `convert`).
    #[prost(string, tag = "1")]
    pub deal_type: String,
    /// Counter currency.
    #[prost(string, tag = "2")]
    pub currency: String,
    /// Rate, fixed point 1e8.
    #[prost(bytes = "vec", tag = "3")]
    pub rate: Vec<u8>,
    /// Minimum deal amount.
    #[prost(bytes = "vec", tag = "4")]
    pub min: Vec<u8>,
    /// Maximum deal amount (empty = unlimited).
    #[prost(bytes = "vec", tag = "5")]
    pub max: Vec<u8>,
}

/// Persisted token configuration (`tokenMetadata`).
#[derive(Clone, PartialEq, Message)]
pub struct TokenConfigRecord {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(uint32, tag = "2")]
    pub decimals: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub issuer: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub fee_setter: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub fee_address_setter: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub total_emission: Vec<u8>,
    #[prost(message, optional, tag = "7")]
    pub fee: Option<FeeRecord>,
    #[prost(message, repeated, tag = "8")]
    pub rates: Vec<RateRecord>,
    #[prost(string, tag = "9")]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Cross-channel transfers
// ---------------------------------------------------------------------------

/// Lifecycle phase of a cross-channel transfer record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum TransferPhase {
    Unspecified = 0,
    CreatedFrom = 1,
    CommittedFrom = 2,
    CreatedTo = 3,
}

/// One `(token, amount)` leg of a multi-asset transfer or swap.
#[derive(Clone, PartialEq, Message)]
pub struct AssetRecord {
    #[prost(string, tag = "1")]
    pub token: String,
    #[prost(bytes = "vec", tag = "2")]
    pub amount: Vec<u8>,
}

/// Cross-channel transfer record, stored under the same id on both sides.
#[derive(Clone, PartialEq, Message)]
pub struct CcTransferRecord {
    #[prost(string, tag = "1")]
    pub id: String,
    /// Source channel.
    #[prost(string, tag = "2")]
    pub from: String,
    /// Destination channel.
    #[prost(string, tag = "3")]
    pub to: String,
    /// Address that initiated the transfer (customer or admin).
    #[prost(bytes = "vec", tag = "4")]
    pub initiator: Vec<u8>,
    /// Address credited on the destination.
    #[prost(bytes = "vec", tag = "5")]
    pub beneficiary: Vec<u8>,
    /// Assets moved; a single-asset transfer has exactly one item.
    #[prost(message, repeated, tag = "6")]
    pub items: Vec<AssetRecord>,
    #[prost(enumeration = "TransferPhase", tag = "7")]
    pub phase: i32,
    /// Host timestamp at creation, milliseconds.
    #[prost(int64, tag = "8")]
    pub timestamp_ms: i64,
    #[prost(bool, tag = "9")]
    pub is_multi: bool,
}

// ---------------------------------------------------------------------------
// Swaps
// ---------------------------------------------------------------------------

/// Which side of a swap a record represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SwapLeg {
    Unspecified = 0,
    Source = 1,
    Target = 2,
}

/// Hash-time-locked swap record.
#[derive(Clone, PartialEq, Message)]
pub struct SwapRecord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub owner: Vec<u8>,
    /// Locked assets; a single swap has exactly one.
    #[prost(message, repeated, tag = "3")]
    pub assets: Vec<AssetRecord>,
    /// Channel where the lock was taken.
    #[prost(string, tag = "4")]
    pub from: String,
    /// Channel where the beneficiary is credited.
    #[prost(string, tag = "5")]
    pub to: String,
    /// SHA3-256 of the secret key.
    #[prost(bytes = "vec", tag = "6")]
    pub hash: Vec<u8>,
    /// Expiry, unix seconds.
    #[prost(int64, tag = "7")]
    pub timeout: i64,
    #[prost(enumeration = "SwapLeg", tag = "8")]
    pub leg: i32,
}

// ---------------------------------------------------------------------------
// ACL wire messages
// ---------------------------------------------------------------------------

/// Account status flags.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct AccountInfoRecord {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub kyc_hash: String,
    #[prost(bool, tag = "2")]
    #[serde(default)]
    pub gray_listed: bool,
    #[prost(bool, tag = "3")]
    #[serde(default)]
    pub black_listed: bool,
    /// User id bound to the address; empty when the ACL has none.
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub user_id: String,
}

/// Address binding returned by the ACL.
#[derive(Clone, PartialEq, Message)]
pub struct AclAddressRecord {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub address: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub is_multisig: bool,
    /// Number of signatures required; equals the key count for n-of-n.
    #[prost(uint32, tag = "4")]
    pub required_signatures: u32,
}

/// Answer to `checkKeys`.
#[derive(Clone, PartialEq, Message)]
pub struct AclResponseRecord {
    #[prost(message, optional, tag = "1")]
    pub account: Option<AccountInfoRecord>,
    #[prost(message, optional, tag = "2")]
    pub address: Option<AclAddressRecord>,
    /// Key type tag per presented key, same order.
    #[prost(int32, repeated, tag = "3")]
    pub key_types: Vec<i32>,
}

/// Answer to `getAccountOperationRight`.
#[derive(Clone, PartialEq, Message)]
pub struct HaveRightRecord {
    #[prost(bool, tag = "1")]
    pub have_right: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_tx_survives_encoding() {
        let tx = PendingTx {
            method: "emit".into(),
            sender: Some(SenderRecord {
                address: vec![7; 32],
                user_id: "u1".into(),
            }),
            args: vec!["a".into(), "1".into()],
            timestamp_ms: 1_700_000_000_000,
            nonce: 1_700_000_000_001,
            request_id: "req".into(),
        };
        let back: PendingTx = decode(&encode(&tx)).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn execute_tasks_accepts_json() {
        let req: ExecuteTasksRequest =
            serde_json::from_str(r#"{"tasks":[{"id":"t1","method":"emit","args":["x"]}]}"#)
                .unwrap();
        assert_eq!(req.tasks.len(), 1);
        assert_eq!(req.tasks[0].method, "emit");
    }

    #[test]
    fn batch_request_uses_camel_case_ids() {
        let req: BatchRequest = serde_json::from_str(r#"{"txIds":["a","b"]}"#).unwrap();
        assert_eq!(req.tx_ids, vec!["a", "b"]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode::<NonceRecord>(&[0xff, 0xff, 0xff]).is_err());
    }
}
