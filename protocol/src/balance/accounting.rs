//! Accounting records.
//!
//! A deployment may want an off-ledger journal of every balance movement.
//! Such a sink is handed to the [`Chaincode`](crate::pipeline::Chaincode)
//! at construction and receives one [`AccountingRecord`] per ledger
//! mutation, just before the write. Records are advisory: a sink cannot
//! fail the operation and must not feed anything back into ledger state.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Namespace;
use crate::types::BigInt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub symbol: String,
    /// Debited holder, empty for a pure credit.
    pub from: String,
    /// Credited holder, empty for a pure debit.
    pub to: String,
    pub amount: BigInt,
    pub from_ns: Option<Namespace>,
    pub to_ns: Option<Namespace>,
    pub reason: String,
}

pub trait AccountingSink: Send + Sync {
    fn record(&self, record: &AccountingRecord);
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AccountingRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AccountingRecord> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AccountingSink for MemorySink {
    fn record(&self, record: &AccountingRecord) {
        self.records.lock().push(record.clone());
    }
}
