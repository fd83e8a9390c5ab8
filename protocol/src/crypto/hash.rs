//! # Hashing Utilities
//!
//! The ledger speaks three hash dialects, each fixed by something outside
//! our control:
//!
//! - **SHA3-256** derives addresses, digests the canonical message for
//!   Edwards-curve signatures, and locks swaps.
//! - **Keccak-256** is what secp256k1 wallets hash with, including the
//!   personal-message preamble.
//! - **SHA-256** (doubled) is the base58-check checksum.

use sha2::Sha256;
use sha3::{Digest, Keccak256, Sha3_256};

fn to_array(digest: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest);
    out
}

/// SHA3-256 digest.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    to_array(&hasher.finalize())
}

/// Keccak-256 digest (the pre-standard SHA3 padding).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    to_array(&hasher.finalize())
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    to_array(&hasher.finalize())
}

/// `SHA-256(SHA-256(data))`.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Digest a secp256k1 wallet signs for an arbitrary message:
/// `keccak256("\x19Ethereum Signed Message:\n32" || keccak256(message))`.
pub fn eth_personal_digest(message: &[u8]) -> [u8; 32] {
    const PREAMBLE: &[u8] = b"\x19Ethereum Signed Message:\n32";
    let inner = keccak256(message);
    let mut buf = Vec::with_capacity(PREAMBLE.len() + inner.len());
    buf.extend_from_slice(PREAMBLE);
    buf.extend_from_slice(&inner);
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_known_vector() {
        // SHA3-256("") from FIPS 202.
        assert_eq!(
            hex::encode(sha3_256(b"")),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn keccak_differs_from_sha3() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_ne!(keccak256(b"x"), sha3_256(b"x"));
    }

    #[test]
    fn double_sha256_is_nested() {
        assert_eq!(double_sha256(b"abc"), sha256(&sha256(b"abc")));
    }

    #[test]
    fn personal_digest_depends_on_message() {
        assert_ne!(eth_personal_digest(b"a"), eth_personal_digest(b"b"));
        assert_eq!(eth_personal_digest(b"a"), eth_personal_digest(b"a"));
    }
}
