//! Value types shared by every component: big integers, addresses and the
//! protobuf records persisted in the ledger.

pub mod address;
pub mod bigint;
pub mod proto;

pub use address::{AccountRef, Address, AddressError};
pub use bigint::{BigInt, BigIntError};
