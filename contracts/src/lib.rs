//! # Ledger Contracts
//!
//! Concrete token contracts assembled from the protocol core:
//!
//! - **Fiat Token**: an issuer-backed currency. The issuer emits and the
//!   holders redeem; everything else (transfers with fees, exchange
//!   against the issuer, cross-channel transfers and swaps) comes from the
//!   core's shared operations.
//! - **Industrial Token**: a token issued in groups (batches of output
//!   with their own emission and maturity). Balances are kept per group:
//!   the group id is the token component of every balance key.
//!
//! ## Design Principles
//!
//! 1. A contract is a router table plus a handful of functions. The core
//!    does signatures, nonces, batching and the balance arithmetic.
//! 2. Every emission changes the recorded total emission in the same
//!    write set, so the books always balance.
//! 3. Zero amounts are rejected everywhere.

pub mod fiat;
pub mod industrial;

pub use fiat::FiatToken;
pub use industrial::IndustrialToken;
