//! Write-buffering overlay used to isolate one batch task.
//!
//! Reads fall through to the parent stub unless the key was written by the
//! task itself; range reads merge both views. Nothing reaches the parent
//! until the executor takes the [`WriteSet`] and applies it, so a failed
//! task is discarded by dropping its overlay.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};

use super::{ChaincodeEvent, ChaincodeStub, Response, WriteSet};
use crate::error::LedgerResult;

pub struct CachedStub<'p> {
    parent: &'p mut dyn ChaincodeStub,
    writes: BTreeMap<String, Option<Vec<u8>>>,
    event: Option<ChaincodeEvent>,
}

impl<'p> CachedStub<'p> {
    pub fn new(parent: &'p mut dyn ChaincodeStub) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
            event: None,
        }
    }

    /// Buffered mutations so far.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            writes: self.writes,
            event: self.event,
        }
    }
}

impl ChaincodeStub for CachedStub<'_> {
    fn tx_id(&self) -> &str {
        self.parent.tx_id()
    }

    fn channel_id(&self) -> &str {
        self.parent.channel_id()
    }

    fn chaincode_name(&self) -> &str {
        self.parent.chaincode_name()
    }

    fn tx_timestamp(&self) -> DateTime<Utc> {
        self.parent.tx_timestamp()
    }

    fn creator(&self) -> &[u8] {
        self.parent.creator()
    }

    fn args(&self) -> &[Vec<u8>] {
        self.parent.args()
    }

    fn get_state(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.parent.get_state(key),
        }
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> LedgerResult<()> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn range(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        let mut merged: BTreeMap<String, Vec<u8>> =
            self.parent.range(start, end)?.into_iter().collect();
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        for (key, value) in self.writes.range::<str, _>((Bound::Included(start), upper)) {
            match value {
                Some(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> LedgerResult<()> {
        self.event = Some(ChaincodeEvent {
            name: name.to_string(),
            payload,
        });
        Ok(())
    }

    fn invoke_chaincode(
        &mut self,
        chaincode: &str,
        args: &[Vec<u8>],
        channel: &str,
    ) -> LedgerResult<Response> {
        self.parent.invoke_chaincode(chaincode, args, channel)
    }
}
