//! # Cryptographic Primitives
//!
//! Hashes, keys and signature verification for the ledger. Everything here
//! is a thin, typed wrapper around audited library implementations
//! (`ed25519-dalek`, `k256`, `sha2`, `sha3`); the only logic of our own is
//! the canonical message layout and the digest each scheme signs.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{double_sha256, keccak256, sha256, sha3_256};
pub use keys::{KeyError, KeyType, Keypair, PublicKey};
pub use signatures::{compose_message, SchemeRegistry, SignatureScheme};
