//! # Stub Adapter
//!
//! The host hands every invocation a transactional key-value handle, the
//! *stub*. All reads and writes of the contract core go through the
//! [`ChaincodeStub`] trait defined here, which is the single mutation
//! surface of the whole crate.
//!
//! ## Guarantees expected from the host
//!
//! - Writes made during one invocation become visible to later reads in the
//!   same invocation (read-your-writes).
//! - The host commits the write set atomically when the entry point returns
//!   an OK [`Response`] and discards it otherwise.
//! - Per-invocation metadata (tx id, proposal timestamp, creator, channel)
//!   is immutable and identical on every endorser.
//!
//! ## Implementations
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`MemoryStub`] | In-memory host used by tests and benches |
//! | [`CachedStub`] | Overlay buffering writes for one batch task |
//! | [`ReadOnlyStub`] | Wrapper refusing writes on the query path |

pub mod cached;
pub mod composite;
pub mod memory;
pub mod readonly;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::error::{LedgerError, LedgerResult};

pub use cached::CachedStub;
pub use composite::{create_composite_key, split_composite_key};
pub use memory::{MemoryStub, MemoryWorld};
pub use readonly::ReadOnlyStub;

// ---------------------------------------------------------------------------
// Host-facing types
// ---------------------------------------------------------------------------

/// Status code of a successful invocation.
pub const STATUS_OK: i32 = 200;

/// Status code of a failed invocation.
pub const STATUS_ERROR: i32 = 500;

/// What an entry point returns to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: i32,
    pub payload: Vec<u8>,
    pub message: String,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self {
            status: STATUS_OK,
            payload,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            payload: Vec::new(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Payload as UTF-8 text, lossy.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl From<LedgerResult<Vec<u8>>> for Response {
    fn from(result: LedgerResult<Vec<u8>>) -> Self {
        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => Response::error(e.to_string()),
        }
    }
}

/// A named event attached to an invocation. The host keeps at most one per
/// transaction; setting another replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// One page of a paginated range read. An empty bookmark means the range
/// is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub bookmark: String,
}

/// Buffered mutations of one invocation or one batch task.
///
/// `None` marks a deletion. Keys iterate in byte order, so applying a write
/// set is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    pub writes: BTreeMap<String, Option<Vec<u8>>>,
    pub event: Option<ChaincodeEvent>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.event.is_none()
    }

    /// Returns `true` if both sets touch at least one common key.
    pub fn intersects(&self, keys: &std::collections::BTreeSet<String>) -> bool {
        self.writes.keys().any(|k| keys.contains(k))
    }

    /// Replays the buffered mutations onto `stub`, event last.
    pub fn apply_to(self, stub: &mut dyn ChaincodeStub) -> LedgerResult<()> {
        for (key, value) in self.writes {
            match value {
                Some(bytes) => stub.put_state(&key, bytes)?,
                None => stub.del_state(&key)?,
            }
        }
        if let Some(event) = self.event {
            stub.set_event(&event.name, event.payload)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// The stub trait
// ---------------------------------------------------------------------------

/// Transactional key-value access for one invocation.
pub trait ChaincodeStub {
    /// Host transaction id.
    fn tx_id(&self) -> &str;

    /// Channel this invocation runs on.
    fn channel_id(&self) -> &str;

    /// Name under which this chaincode is installed.
    fn chaincode_name(&self) -> &str;

    /// Proposal timestamp assigned by the client and fixed for all endorsers.
    fn tx_timestamp(&self) -> DateTime<Utc>;

    /// Serialized identity of the invoker.
    fn creator(&self) -> &[u8];

    /// Raw invocation arguments; `args()[0]` is the function name.
    fn args(&self) -> &[Vec<u8>];

    fn get_state(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    fn del_state(&mut self, key: &str) -> LedgerResult<()>;

    /// All entries with `start <= key < end`, ascending. An empty `end`
    /// means unbounded.
    fn range(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>>;

    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> LedgerResult<()>;

    /// Calls another chaincode and returns its response. A non-OK response
    /// is returned as is; only transport failures are errors.
    fn invoke_chaincode(
        &mut self,
        chaincode: &str,
        args: &[Vec<u8>],
        channel: &str,
    ) -> LedgerResult<Response>;

    /// One page of [`range`](Self::range). The bookmark is the first key of
    /// the next page.
    fn range_paginated(
        &self,
        start: &str,
        end: &str,
        page_size: u32,
        bookmark: &str,
    ) -> LedgerResult<Page<(String, Vec<u8>)>> {
        let from = if bookmark.is_empty() {
            start
        } else {
            if bookmark < start || (!end.is_empty() && bookmark >= end) {
                return Err(LedgerError::Malformed(format!(
                    "bookmark {:?} outside range",
                    bookmark
                )));
            }
            bookmark
        };
        let size = if page_size == 0 {
            DEFAULT_PAGE_SIZE as usize
        } else {
            page_size as usize
        };

        let mut items = self.range(from, end)?;
        let bookmark = items.get(size).map(|(k, _)| k.clone()).unwrap_or_default();
        items.truncate(size);
        Ok(Page { items, bookmark })
    }
}

/// The two host entry points of a contract.
///
/// Peer chaincodes registered with a [`MemoryWorld`] implement this too,
/// which is how the in-memory host serves cross-chaincode calls.
pub trait ChaincodeInterface: Send + Sync {
    /// Called once when the chaincode is instantiated.
    fn init(&self, stub: &mut dyn ChaincodeStub) -> Response;

    /// State-mutating entry.
    fn invoke(&self, stub: &mut dyn ChaincodeStub) -> Response;

    /// Read-only entry. Defaults to `invoke`, for peers with no separate
    /// query path.
    fn query(&self, stub: &mut dyn ChaincodeStub) -> Response {
        self.invoke(stub)
    }
}

/// Decodes an argument as UTF-8.
pub(crate) fn arg_text(args: &[Vec<u8>], index: usize) -> LedgerResult<&str> {
    let raw = args
        .get(index)
        .ok_or_else(|| LedgerError::Malformed(format!("missing argument {}", index)))?;
    std::str::from_utf8(raw)
        .map_err(|_| LedgerError::Malformed(format!("argument {} is not UTF-8", index)))
}
