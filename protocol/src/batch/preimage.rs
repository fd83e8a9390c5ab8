//! Queued transactions.
//!
//! A deferred invocation is stored as a [`PendingTx`] under
//! `(batchTransactions, txid)` and removed by the batch that executes it,
//! whatever the outcome.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::KEY_BATCH_TRANSACTIONS;
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};
use crate::stub::composite::create_composite_key;
use crate::stub::ChaincodeStub;
use crate::types::proto::{self, PendingTx, SenderRecord};
use crate::types::{AccountRef, Address};

pub fn key(tx_id: &str) -> LedgerResult<String> {
    create_composite_key(KEY_BATCH_TRANSACTIONS, &[tx_id])
}

pub fn store(stub: &mut dyn ChaincodeStub, tx_id: &str, pending: &PendingTx) -> LedgerResult<()> {
    let key = key(tx_id)?;
    if stub.get_state(&key)?.is_some() {
        return Err(LedgerError::Invariant(format!("preimage {} already queued", tx_id)));
    }
    stub.put_state(&key, proto::encode(pending))
}

pub fn load(stub: &dyn ChaincodeStub, tx_id: &str) -> LedgerResult<Option<PendingTx>> {
    match stub.get_state(&key(tx_id)?)? {
        Some(bytes) => Ok(Some(proto::decode(&bytes)?)),
        None => Ok(None),
    }
}

pub fn delete(stub: &mut dyn ChaincodeStub, tx_id: &str) -> LedgerResult<()> {
    stub.del_state(&key(tx_id)?)
}

pub(crate) fn sender_record(sender: &AccountRef) -> SenderRecord {
    SenderRecord {
        address: sender.address().as_bytes().to_vec(),
        user_id: sender.user_id().unwrap_or_default().to_string(),
    }
}

pub(crate) fn sender_of(pending: &PendingTx) -> LedgerResult<Option<AccountRef>> {
    pending
        .sender
        .as_ref()
        .map(|s| {
            let address = Address::from_slice(&s.address)?;
            Ok(if s.user_id.is_empty() {
                AccountRef::unresolved(address)
            } else {
                AccountRef::resolved(address, s.user_id.clone())
            })
        })
        .transpose()
}

pub(crate) fn timestamp_of(pending: &PendingTx) -> LedgerResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(pending.timestamp_ms)
        .single()
        .ok_or_else(|| {
            LedgerError::Malformed(format!(
                "preimage timestamp {} out of range",
                pending.timestamp_ms
            ))
        })
}

/// Readable form of a queued transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreimageView {
    pub id: String,
    pub method: String,
    pub sender: Option<Address>,
    #[serde(default)]
    pub user_id: String,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub nonce: u64,
    pub request_id: String,
}

impl PreimageView {
    pub fn new(id: &str, pending: PendingTx) -> LedgerResult<Self> {
        let sender = sender_of(&pending)?;
        Ok(Self {
            id: id.to_string(),
            timestamp: timestamp_of(&pending)?,
            sender: sender.as_ref().map(|s| *s.address()),
            user_id: sender
                .as_ref()
                .and_then(AccountRef::user_id)
                .unwrap_or_default()
                .to_string(),
            method: pending.method,
            args: pending.args,
            nonce: pending.nonce,
            request_id: pending.request_id,
        })
    }
}

/// `batchTransaction(txid)`: the queued preimage, for relays.
pub fn batch_transaction<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    tx_id: String,
) -> LedgerResult<PreimageView> {
    let pending = load(ctx.stub(), &tx_id)?
        .ok_or_else(|| LedgerError::domain(format!("transaction {} not found", tx_id)))?;
    PreimageView::new(&tx_id, pending)
}
