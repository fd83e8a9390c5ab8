// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ledger Protocol: Contract Core
//!
//! The reusable core that token contracts on a permissioned ledger are
//! built from. A contract declares its operations as plain Rust functions;
//! the core turns host invocations into calls to those functions and
//! handles the parts nobody should write twice: signatures, replay
//! protection, account status, batching, balances, fees and the
//! choreography of moving value between channels.
//!
//! ## Architecture
//!
//! - **stub**: The host's key/value interface, plus the in-memory host,
//!   the read-only wrapper and the write-buffering overlay.
//! - **types**: Big integers, addresses and the protobuf wire records.
//! - **crypto**: Hashes, key types and the signature-scheme registry.
//! - **acl**: Who owns which keys, and whether they may act at all.
//! - **balance**: The namespaced balance ledger and its accounting hook.
//! - **router**: Typed handler binding, argument decoding, method kinds.
//! - **envelope**: Layout of signed and unsigned invocation arguments.
//! - **nonce**: Per-sender sliding window against replay.
//! - **pipeline**: The host-facing [`Chaincode`]: authenticate, route, queue.
//! - **batch**: Deferred execution with per-task isolation.
//! - **token**: Token config, fees, rates and the base token operations.
//! - **transfer**: Cross-channel transfers driven by a relay.
//! - **swap**: Hash-time-locked swaps between channels.
//! - **config**: Protocol constants and [`CoreSettings`].
//!
//! ## Ground Rules
//!
//! 1. Handlers are deterministic: the host clock, no randomness, no I/O
//!    except through the stub.
//! 2. Balances never go negative. Subtraction is checked, always.
//! 3. A failed invocation writes nothing. A failed batch task writes
//!    nothing either, while its neighbours commit.
//! 4. If it touches money, it has tests.

pub mod acl;
pub mod balance;
pub mod batch;
pub mod config;
pub mod context;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod nonce;
pub mod pipeline;
pub mod router;
pub mod stub;
pub mod swap;
pub mod token;
pub mod transfer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CoreSettings;
pub use context::{Environment, TxContext};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use pipeline::{init_token, Chaincode, Contract};
pub use router::{AuthPolicy, MethodKind, RouterBuilder};
pub use stub::{ChaincodeInterface, ChaincodeStub, Response};
pub use token::TokenConfig;
pub use types::{AccountRef, Address, BigInt};

/// Crate version, reported by the development node.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
