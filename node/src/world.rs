//! # Sled World State
//!
//! The development node's ledger. One sled database holds:
//!
//! | Tree     | Key            | Value                          |
//! |----------|----------------|--------------------------------|
//! | `state`  | state key      | raw value                      |
//! | `events` | tx id (UTF-8)  | JSON `ChaincodeEvent`          |
//! | `meta`   | `seq`          | last transaction sequence (BE) |
//!
//! Every invocation runs against a [`SledStub`] that reads through to the
//! `state` tree and buffers its writes. A successful `init` or `invoke`
//! commits the write set, its event and the new sequence number in one
//! sled transaction. Failed invocations and queries commit nothing.
//!
//! Invocations are serialised by a single writer lock; queries read the
//! committed state without taking it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::{debug, warn};

use ledger_protocol::stub::{ChaincodeEvent, WriteSet};
use ledger_protocol::{ChaincodeInterface, ChaincodeStub, LedgerError, LedgerResult, Response};

const META_SEQ: &[u8] = b"seq";

/// Which host entry point to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Init,
    Invoke,
    Query,
}

impl Entry {
    pub fn as_str(self) -> &'static str {
        match self {
            Entry::Init => "init",
            Entry::Invoke => "invoke",
            Entry::Query => "query",
        }
    }
}

/// Result of one invocation.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub tx_id: String,
    pub response: Response,
    /// Keys written, zero for failures and queries.
    pub committed_keys: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt {0} record")]
    Corrupt(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type WorldResult<T> = Result<T, WorldError>;

/// Persistent world state of one channel/chaincode pair.
pub struct SledWorld {
    db: Db,
    state: Tree,
    events: Tree,
    meta: Tree,
    channel: String,
    chaincode: String,
    writer: Mutex<()>,
}

impl SledWorld {
    pub fn open<P: AsRef<Path>>(path: P, channel: &str, chaincode: &str) -> WorldResult<Self> {
        Self::from_db(sled::open(path)?, channel, chaincode)
    }

    /// In-memory database removed on drop.
    pub fn open_temporary(channel: &str, chaincode: &str) -> WorldResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?, channel, chaincode)
    }

    fn from_db(db: Db, channel: &str, chaincode: &str) -> WorldResult<Self> {
        Ok(Self {
            state: db.open_tree("state")?,
            events: db.open_tree("events")?,
            meta: db.open_tree("meta")?,
            db,
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            writer: Mutex::new(()),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn chaincode(&self) -> &str {
        &self.chaincode
    }

    /// Sequence number of the last committed transaction.
    pub fn sequence(&self) -> WorldResult<u64> {
        match self.meta.get(META_SEQ)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_ref()
                    .try_into()
                    .map_err(|_| WorldError::Corrupt("sequence"))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Number of committed state keys.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn get(&self, key: &str) -> WorldResult<Option<Vec<u8>>> {
        Ok(self.state.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Event committed by transaction `tx_id`, if it set one.
    pub fn event(&self, tx_id: &str) -> WorldResult<Option<ChaincodeEvent>> {
        match self.events.get(tx_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> WorldResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Runs one entry point of `chaincode` and commits on success.
    pub fn execute(
        &self,
        chaincode: &dyn ChaincodeInterface,
        entry: Entry,
        creator: &[u8],
        args: Vec<Vec<u8>>,
    ) -> WorldResult<Outcome> {
        if entry == Entry::Query {
            let mut stub = self.stub(uuid::Uuid::new_v4().simple().to_string(), creator, args);
            let response = chaincode.query(&mut stub);
            return Ok(Outcome {
                tx_id: stub.tx_id,
                response,
                committed_keys: 0,
            });
        }

        let _guard = self.writer.lock();
        let seq = self.sequence()? + 1;
        let tx_id = uuid::Uuid::new_v4().simple().to_string();
        let (response, write_set) = {
            let mut stub = self.stub(tx_id.clone(), creator, args);
            let response = match entry {
                Entry::Init => chaincode.init(&mut stub),
                _ => chaincode.invoke(&mut stub),
            };
            (response, stub.into_write_set())
        };
        if !response.is_ok() {
            debug!(
                %tx_id,
                entry = entry.as_str(),
                message = %response.message,
                "invocation discarded"
            );
            return Ok(Outcome {
                tx_id,
                response,
                committed_keys: 0,
            });
        }
        let committed_keys = write_set.writes.len();
        self.commit(&tx_id, seq, write_set)?;
        Ok(Outcome {
            tx_id,
            response,
            committed_keys,
        })
    }

    fn stub(&self, tx_id: String, creator: &[u8], args: Vec<Vec<u8>>) -> SledStub<'_> {
        SledStub {
            world: self,
            tx_id,
            timestamp: Utc::now(),
            creator: creator.to_vec(),
            args,
            writes: BTreeMap::new(),
            event: None,
        }
    }

    fn commit(&self, tx_id: &str, seq: u64, write_set: WriteSet) -> WorldResult<()> {
        let event = write_set.event.as_ref().map(serde_json::to_vec).transpose()?;
        let result: Result<(), TransactionError<()>> =
            (&self.state, &self.events, &self.meta).transaction(|(state, events, meta)| {
                for (key, value) in &write_set.writes {
                    match value {
                        Some(bytes) => {
                            state.insert(key.as_bytes(), bytes.as_slice())?;
                        }
                        None => {
                            state.remove(key.as_bytes())?;
                        }
                    }
                }
                if let Some(bytes) = &event {
                    events.insert(tx_id.as_bytes(), bytes.as_slice())?;
                }
                meta.insert(META_SEQ, seq.to_be_bytes().to_vec())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            });
        match result {
            Ok(()) => {
                debug!(%tx_id, seq, keys = write_set.writes.len(), "committed");
                Ok(())
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
            Err(TransactionError::Abort(())) => Err(WorldError::Corrupt("transaction")),
        }
    }
}

/// Stub of one invocation against a [`SledWorld`].
pub struct SledStub<'w> {
    world: &'w SledWorld,
    tx_id: String,
    timestamp: DateTime<Utc>,
    creator: Vec<u8>,
    args: Vec<Vec<u8>>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
    event: Option<ChaincodeEvent>,
}

impl SledStub<'_> {
    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            writes: self.writes,
            event: self.event,
        }
    }
}

fn storage(e: sled::Error) -> LedgerError {
    LedgerError::Stub(e.to_string())
}

impl ChaincodeStub for SledStub<'_> {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn channel_id(&self) -> &str {
        &self.world.channel
    }

    fn chaincode_name(&self) -> &str {
        &self.world.chaincode
    }

    fn tx_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn creator(&self) -> &[u8] {
        &self.creator
    }

    fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    fn get_state(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.world.state.get(key.as_bytes()).map_err(storage)?.map(|v| v.to_vec()))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        if key.is_empty() {
            return Err(LedgerError::Stub("empty key".into()));
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> LedgerResult<()> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn range(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        let committed = if end.is_empty() {
            self.world.state.range(start.as_bytes()..)
        } else {
            self.world.state.range(start.as_bytes()..end.as_bytes())
        };
        let mut merged = BTreeMap::new();
        for item in committed {
            let (key, value) = item.map_err(storage)?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|_| LedgerError::Stub("state key is not UTF-8".into()))?;
            merged.insert(key, value.to_vec());
        }

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
        if name.is_empty() {
            return Err(LedgerError::Stub("empty event name".into()));
        }
        self.event = Some(ChaincodeEvent {
            name: name.to_string(),
            payload,
        });
        Ok(())
    }

    fn invoke_chaincode(
        &mut self,
        chaincode: &str,
        _args: &[Vec<u8>],
        _channel: &str,
    ) -> LedgerResult<Response> {
        warn!(chaincode, "cross-chaincode call on the development node");
        Err(LedgerError::Stub(format!(
            "chaincode {} is not reachable from the development node",
            chaincode
        )))
    }
}
