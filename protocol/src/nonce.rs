//! # Nonce Guard
//!
//! Replay protection for signed invocations. Each sender keeps a window of
//! its most recently accepted nonces, newest first, stored under
//! `(nonce, address)`.
//!
//! A nonce is accepted iff:
//!
//! 1. it lies in `[NONCE_FLOOR, NONCE_CEILING)`,
//! 2. it is not already in the window,
//! 3. once the window is full, it is above the oldest retained value.
//!
//! Accepted nonces are inserted in order and the window is cut back to its
//! size, so out-of-order delivery within the window is tolerated while
//! anything older than the window is refused.

use tracing::warn;

use crate::config::{KEY_NONCE, NONCE_CEILING, NONCE_FLOOR};
use crate::error::{LedgerError, LedgerResult};
use crate::stub::composite::create_composite_key;
use crate::stub::ChaincodeStub;
use crate::types::proto::{self, NonceRecord};
use crate::types::Address;

/// Parses the envelope's nonce field.
pub fn parse_nonce(text: &str) -> LedgerResult<u64> {
    let nonce: u64 = text
        .parse()
        .map_err(|_| {
            LedgerError::Malformed(format!("nonce {:?} is not an unsigned integer", text))
        })?;
    if !(NONCE_FLOOR..NONCE_CEILING).contains(&nonce) {
        return Err(LedgerError::NonceOutOfRange(nonce));
    }
    Ok(nonce)
}

/// Applies the acceptance rule to an in-memory window (sorted descending).
pub fn accept(window: &mut Vec<u64>, nonce: u64, capacity: usize) -> LedgerResult<()> {
    if !(NONCE_FLOOR..NONCE_CEILING).contains(&nonce) {
        return Err(LedgerError::NonceOutOfRange(nonce));
    }
    // Descending order: binary search on the reversed comparison.
    let position = match window.binary_search_by(|held| nonce.cmp(held)) {
        Ok(_) => return Err(LedgerError::NonceAlreadyUsed(nonce)),
        Err(position) => position,
    };
    if window.len() >= capacity {
        if let Some(&oldest) = window.last() {
            if nonce <= oldest {
                return Err(LedgerError::NonceTooOld { nonce, oldest });
            }
        }
    }
    window.insert(position, nonce);
    window.truncate(capacity.max(1));
    Ok(())
}

/// Persistent per-sender nonce windows.
#[derive(Debug, Clone, Copy)]
pub struct NonceGuard {
    capacity: usize,
}

impl NonceGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    fn key(address: &Address) -> LedgerResult<String> {
        create_composite_key(KEY_NONCE, &[address.to_string()])
    }

    /// Current window of `address`, newest first.
    pub fn window(&self, stub: &dyn ChaincodeStub, address: &Address) -> LedgerResult<Vec<u64>> {
        match stub.get_state(&Self::key(address)?)? {
            Some(bytes) => Ok(proto::decode::<NonceRecord>(&bytes)?.nonces),
            None => Ok(Vec::new()),
        }
    }

    /// Checks `nonce` for `address` and records it on success.
    pub fn check_and_record(
        &self,
        stub: &mut dyn ChaincodeStub,
        address: &Address,
        nonce: u64,
    ) -> LedgerResult<()> {
        let mut window = self.window(&*stub, address)?;
        if let Err(e) = accept(&mut window, nonce, self.capacity) {
            warn!(%address, nonce, error = %e, "nonce rejected");
            return Err(e);
        }
        stub.put_state(&Self::key(address)?, proto::encode(&NonceRecord { nonces: window }))
    }
}
