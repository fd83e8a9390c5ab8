//! # In-Memory Host
//!
//! [`MemoryWorld`] plays the part of one channel of the host platform: it
//! owns the committed world state of a chaincode, hands out a
//! [`MemoryStub`] per invocation, and commits the stub's write set only
//! when the entry point returns OK.
//!
//! Other chaincodes on the same channel (the ACL, typically) are registered
//! as peers. A cross-chaincode call runs the peer's `invoke` against its own
//! namespace; the peer's writes are discarded, which matches how the
//! platform treats calls whose results are only read.
//!
//! Transaction ids are derived from a counter so test runs are repeatable.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{ChaincodeEvent, ChaincodeInterface, ChaincodeStub, Response, WriteSet};
use crate::crypto::hash::sha256;
use crate::error::{LedgerError, LedgerResult};

/// An event recorded at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub tx_id: String,
    pub event: ChaincodeEvent,
}

/// One channel's world state plus the peers reachable from it.
pub struct MemoryWorld {
    channel: String,
    chaincode: String,
    states: HashMap<String, BTreeMap<String, Vec<u8>>>,
    peers: HashMap<String, Arc<dyn ChaincodeInterface>>,
    events: Vec<EmittedEvent>,
    clock: DateTime<Utc>,
    seq: u64,
    last_tx_id: Option<String>,
}

impl MemoryWorld {
    pub fn new(channel: impl Into<String>, chaincode: impl Into<String>) -> Self {
        let chaincode = chaincode.into();
        let mut states = HashMap::new();
        states.insert(chaincode.clone(), BTreeMap::new());
        Self {
            channel: channel.into(),
            chaincode,
            states,
            peers: HashMap::new(),
            events: Vec::new(),
            // 2023-11-14T22:13:20Z, far enough above the nonce floor.
            clock: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
            seq: 0,
            last_tx_id: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn chaincode(&self) -> &str {
        &self.chaincode
    }

    /// Makes `chaincode` reachable through `invoke_chaincode`.
    pub fn register_peer(
        &mut self,
        chaincode: impl Into<String>,
        peer: Arc<dyn ChaincodeInterface>,
    ) {
        let name = chaincode.into();
        self.states.entry(name.clone()).or_default();
        self.peers.insert(name, peer);
    }

    // -- Clock ---------------------------------------------------------------

    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn set_time(&mut self, at: DateTime<Utc>) {
        self.clock = at;
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
    }

    // -- State access --------------------------------------------------------

    /// Committed value of `key` in this chaincode's namespace.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.states
            .get(&self.chaincode)
            .and_then(|s| s.get(key))
            .map(Vec::as_slice)
    }

    /// Writes directly into committed state, bypassing any entry point.
    pub fn seed(&mut self, key: &str, value: Vec<u8>) {
        self.states
            .entry(self.chaincode.clone())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Number of committed keys in this chaincode's namespace.
    pub fn len(&self) -> usize {
        self.states.get(&self.chaincode).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.states
            .get(&self.chaincode)
            .map(|s| {
                s.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every event committed so far, oldest first.
    pub fn events(&self) -> &[EmittedEvent] {
        &self.events
    }

    pub fn last_event(&self) -> Option<&EmittedEvent> {
        self.events.last()
    }

    /// Id of the most recent invocation, committed or not.
    pub fn last_tx_id(&self) -> Option<&str> {
        self.last_tx_id.as_deref()
    }

    // -- Invocations ---------------------------------------------------------

    fn tx_id_for(&self, seq: u64) -> String {
        let mut seed = self.channel.as_bytes().to_vec();
        seed.extend_from_slice(&seq.to_be_bytes());
        hex::encode(sha256(&seed))
    }

    /// A stub over committed state for the next transaction id. Nothing is
    /// committed unless the caller applies the stub's write set.
    pub fn stub(&self, creator: Vec<u8>, args: Vec<Vec<u8>>) -> MemoryStub<'_> {
        self.stub_for(&self.chaincode, self.tx_id_for(self.seq + 1), creator, args)
    }

    fn stub_for(
        &self,
        namespace: &str,
        tx_id: String,
        creator: Vec<u8>,
        args: Vec<Vec<u8>>,
    ) -> MemoryStub<'_> {
        MemoryStub {
            world: self,
            namespace: namespace.to_string(),
            tx_id,
            timestamp: self.clock,
            creator,
            args,
            writes: BTreeMap::new(),
            event: None,
        }
    }

    /// Applies a write set produced by a stub of this world.
    pub fn commit(&mut self, tx_id: &str, write_set: WriteSet) {
        let state = self.states.entry(self.chaincode.clone()).or_default();
        for (key, value) in write_set.writes {
            match value {
                Some(bytes) => {
                    state.insert(key, bytes);
                }
                None => {
                    state.remove(&key);
                }
            }
        }
        if let Some(event) = write_set.event {
            self.events.push(EmittedEvent {
                tx_id: tx_id.to_string(),
                event,
            });
        }
    }

    fn run<F>(&mut self, creator: &[u8], args: Vec<Vec<u8>>, entry: F) -> Response
    where
        F: FnOnce(&mut dyn ChaincodeStub) -> Response,
    {
        self.seq += 1;
        let tx_id = self.tx_id_for(self.seq);
        self.last_tx_id = Some(tx_id.clone());

        let (response, write_set) = {
            let mut stub = self.stub_for(&self.chaincode, tx_id.clone(), creator.to_vec(), args);
            let response = entry(&mut stub);
            (response, stub.into_write_set())
        };
        if response.is_ok() {
            self.commit(&tx_id, write_set);
        }
        response
    }

    /// Runs `init` and commits on success.
    pub fn init(
        &mut self,
        chaincode: &dyn ChaincodeInterface,
        creator: &[u8],
        args: Vec<Vec<u8>>,
    ) -> Response {
        self.run(creator, args, |stub| chaincode.init(stub))
    }

    /// Runs `invoke` and commits on success.
    pub fn invoke(
        &mut self,
        chaincode: &dyn ChaincodeInterface,
        creator: &[u8],
        args: Vec<Vec<u8>>,
    ) -> Response {
        self.run(creator, args, |stub| chaincode.invoke(stub))
    }

    /// Runs `query`. A query never commits, whatever it returns.
    pub fn query(
        &self,
        chaincode: &dyn ChaincodeInterface,
        creator: &[u8],
        args: Vec<Vec<u8>>,
    ) -> Response {
        let mut stub = self.stub(creator.to_vec(), args);
        chaincode.query(&mut stub)
    }
}

/// Stub of one invocation against a [`MemoryWorld`].
pub struct MemoryStub<'w> {
    world: &'w MemoryWorld,
    namespace: String,
    tx_id: String,
    timestamp: DateTime<Utc>,
    creator: Vec<u8>,
    args: Vec<Vec<u8>>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
    event: Option<ChaincodeEvent>,
}

impl<'w> MemoryStub<'w> {
    /// Consumes the stub, yielding the buffered mutations.
    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            writes: self.writes,
            event: self.event,
        }
    }

    fn committed(&self) -> Option<&'w BTreeMap<String, Vec<u8>>> {
        self.world.states.get(&self.namespace)
    }
}

impl ChaincodeStub for MemoryStub<'_> {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn channel_id(&self) -> &str {
        &self.world.channel
    }

    fn chaincode_name(&self) -> &str {
        &self.namespace
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
        Ok(self.committed().and_then(|s| s.get(key)).cloned())
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
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        let bounds = (Bound::Included(start), upper);

        let mut merged: BTreeMap<String, Vec<u8>> = self
            .committed()
            .map(|s| {
                s.range::<str, _>(bounds)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for (key, value) in self.writes.range::<str, _>(bounds) {
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
        args: &[Vec<u8>],
        channel: &str,
    ) -> LedgerResult<Response> {
        if !channel.is_empty() && channel != self.world.channel {
            return Err(LedgerError::Stub(format!(
                "channel {} is not reachable from {}",
                channel, self.world.channel
            )));
        }
        let peer = self.world.peers.get(chaincode).ok_or_else(|| {
            LedgerError::Stub(format!("chaincode {} is not installed", chaincode))
        })?;
        let mut nested = self.world.stub_for(
            chaincode,
            self.tx_id.clone(),
            self.creator.clone(),
            args.to_vec(),
        );
        Ok(peer.invoke(&mut nested))
    }
}
