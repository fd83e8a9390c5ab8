//! # Cross-Channel Transfer
//!
//! Moves value between two channels running this core. The source side
//! debits the sender and records the transfer; a relay then mirrors the
//! record on the destination, which credits the beneficiary, and finally
//! walks both records to deletion:
//!
//! ```text
//! source:       CreatedFrom ──commit──► CommittedFrom ──delete──► gone
//!                    └──cancel──► gone (balance restored)
//! destination:  CreatedTo ──remove──► gone
//! ```
//!
//! The native token leaving its home channel is tracked in the `Given`
//! counter of the destination channel. A foreign token (held as an
//! allowed balance) may only travel back to the channel it came from,
//! where the `Given` counter is paid down again.
//!
//! Every relay step is idempotent by transfer id.

pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::config::{KEY_CC_TRANSFER_FROM, KEY_CC_TRANSFER_TO};
use crate::error::{LedgerError, LedgerResult};
use crate::stub::composite::create_composite_key;
use crate::stub::ChaincodeStub;
use crate::types::proto::{self, AssetRecord, CcTransferRecord, TransferPhase};
use crate::types::{Address, BigInt};

pub use handlers::{routes, TransferPage};

/// Which table a transfer record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    From,
    To,
}

impl Side {
    fn object_type(self) -> &'static str {
        match self {
            Side::From => KEY_CC_TRANSFER_FROM,
            Side::To => KEY_CC_TRANSFER_TO,
        }
    }
}

/// Phase of a transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    CreatedFrom,
    CommittedFrom,
    CreatedTo,
}

impl Phase {
    fn to_wire(self) -> TransferPhase {
        match self {
            Phase::CreatedFrom => TransferPhase::CreatedFrom,
            Phase::CommittedFrom => TransferPhase::CommittedFrom,
            Phase::CreatedTo => TransferPhase::CreatedTo,
        }
    }

    fn from_wire(raw: i32) -> LedgerResult<Self> {
        match TransferPhase::try_from(raw) {
            Ok(TransferPhase::CreatedFrom) => Ok(Phase::CreatedFrom),
            Ok(TransferPhase::CommittedFrom) => Ok(Phase::CommittedFrom),
            Ok(TransferPhase::CreatedTo) => Ok(Phase::CreatedTo),
            _ => Err(LedgerError::Invariant(format!("transfer phase {} is not valid", raw))),
        }
    }
}

/// One `(token, amount)` leg of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub token: String,
    pub amount: BigInt,
}

/// A transfer record in the form relays read and write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    /// Source channel.
    pub from: String,
    /// Destination channel.
    pub to: String,
    pub initiator: Address,
    pub beneficiary: Address,
    pub items: Vec<TransferItem>,
    pub phase: Phase,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub is_multi: bool,
}

impl Transfer {
    pub fn to_record(&self) -> CcTransferRecord {
        CcTransferRecord {
            id: self.id.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            initiator: self.initiator.as_bytes().to_vec(),
            beneficiary: self.beneficiary.as_bytes().to_vec(),
            items: self
                .items
                .iter()
                .map(|item| AssetRecord {
                    token: item.token.clone(),
                    amount: item.amount.to_bytes(),
                })
                .collect(),
            phase: self.phase.to_wire() as i32,
            timestamp_ms: self.timestamp_ms,
            is_multi: self.is_multi,
        }
    }

    pub fn from_record(record: CcTransferRecord) -> LedgerResult<Self> {
        Ok(Self {
            phase: Phase::from_wire(record.phase)?,
            initiator: Address::from_slice(&record.initiator)?,
            beneficiary: Address::from_slice(&record.beneficiary)?,
            items: record
                .items
                .into_iter()
                .map(|a| TransferItem {
                    token: a.token,
                    amount: BigInt::from_bytes(&a.amount),
                })
                .collect(),
            id: record.id,
            from: record.from,
            to: record.to,
            timestamp_ms: record.timestamp_ms,
            is_multi: record.is_multi,
        })
    }
}

pub fn key(side: Side, id: &str) -> LedgerResult<String> {
    create_composite_key(side.object_type(), &[id])
}

pub fn load(stub: &dyn ChaincodeStub, side: Side, id: &str) -> LedgerResult<Option<Transfer>> {
    match stub.get_state(&key(side, id)?)? {
        Some(bytes) => Ok(Some(Transfer::from_record(proto::decode(&bytes)?)?)),
        None => Ok(None),
    }
}

pub fn save(stub: &mut dyn ChaincodeStub, side: Side, transfer: &Transfer) -> LedgerResult<()> {
    stub.put_state(&key(side, &transfer.id)?, proto::encode(&transfer.to_record()))
}

pub fn remove(stub: &mut dyn ChaincodeStub, side: Side, id: &str) -> LedgerResult<()> {
    stub.del_state(&key(side, id)?)
}

/// Normalises and validates the legs of a new transfer: tokens upper-cased,
/// amounts non-zero, no token twice.
pub fn normalize_items(items: Vec<TransferItem>) -> LedgerResult<Vec<TransferItem>> {
    if items.is_empty() {
        return Err(LedgerError::domain("transfer has no items"));
    }
    let mut seen = std::collections::BTreeSet::new();
    items
        .into_iter()
        .map(|item| {
            if item.amount.is_zero() {
                return Err(LedgerError::ZeroAmount);
            }
            let token = item.token.to_uppercase();
            if token.is_empty() {
                return Err(LedgerError::domain("empty token in transfer"));
            }
            if !seen.insert(token.clone()) {
                return Err(LedgerError::domain(format!(
                    "token {} appears twice in transfer",
                    token
                )));
            }
            Ok(TransferItem {
                token,
                amount: item.amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::MemoryWorld;

    fn sample() -> Transfer {
        Transfer {
            id: "t1".into(),
            from: "fiat".into(),
            to: "cc".into(),
            initiator: Address::from_public_key(b"a"),
            beneficiary: Address::from_public_key(b"b"),
            items: vec![TransferItem {
                token: "FIAT".into(),
                amount: BigInt::from(450),
            }],
            phase: Phase::CreatedFrom,
            timestamp_ms: 1_700_000_000_000,
            is_multi: false,
        }
    }

    #[test]
    fn record_survives_storage() {
        let world = MemoryWorld::new("fiat", "fiat");
        let mut stub = world.stub(Vec::new(), Vec::new());
        save(&mut stub, Side::From, &sample()).unwrap();
        assert_eq!(load(&stub, Side::From, "t1").unwrap(), Some(sample()));
        assert_eq!(load(&stub, Side::To, "t1").unwrap(), None);
        remove(&mut stub, Side::From, "t1").unwrap();
        assert_eq!(load(&stub, Side::From, "t1").unwrap(), None);
    }

    #[test]
    fn json_form_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["phase"], "createdFrom");
        assert_eq!(json["items"][0]["amount"], "450");
        assert!(json.get("timestampMs").is_some());
    }

    #[test]
    fn items_are_normalized() {
        let items = normalize_items(vec![TransferItem {
            token: "usd".into(),
            amount: BigInt::from(1),
        }])
        .unwrap();
        assert_eq!(items[0].token, "USD");

        let twice = vec![
            TransferItem {
                token: "usd".into(),
                amount: BigInt::from(1),
            },
            TransferItem {
                token: "USD".into(),
                amount: BigInt::from(2),
            },
        ];
        assert!(normalize_items(twice).is_err());
        assert!(matches!(
            normalize_items(vec![TransferItem {
                token: "USD".into(),
                amount: BigInt::zero(),
            }]),
            Err(LedgerError::ZeroAmount)
        ));
        assert!(normalize_items(Vec::new()).is_err());
    }
}
