//! # Key Management
//!
//! Key types, keypairs and public keys for every scheme the ledger knows.
//!
//! The ACL tells the core which scheme each presented key belongs to, via a
//! numeric tag ([`KeyType`]). Ed25519 is the primary scheme. Secp256k1 is
//! there for wallets that already hold Ethereum-style keys. The two GOST
//! tags are recognised so envelopes carrying them route to a pluggable
//! verifier (see [`SchemeRegistry`](super::signatures::SchemeRegistry))
//! instead of failing as garbage.
//!
//! Key bytes are never logged. `Keypair`'s `Debug` prints the public half.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::Signer as _;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hash::{eth_personal_digest, sha3_256};
use crate::types::Address;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid public key for {0}")]
    InvalidPublicKey(KeyType),

    #[error("invalid secret key for {0}")]
    InvalidSecretKey(KeyType),

    #[error("invalid base58 key encoding: {0}")]
    InvalidEncoding(String),

    #[error("unknown key type tag: {0}")]
    UnknownKeyType(String),

    #[error("key generation is not available for {0}")]
    GenerationUnsupported(KeyType),
}

/// Signature scheme tag, as recorded by the ACL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Edwards-curve Ed25519 (primary).
    Ed25519 = 0,
    /// Short-Weierstrass secp256k1 with the personal-message preamble.
    Secp256k1 = 1,
    /// GOST R 34.10-2001 family.
    Gost = 2,
    /// GOST R 34.10-2012 family.
    Gost2012 = 3,
}

impl KeyType {
    /// Maps the ACL's numeric tag.
    pub fn from_tag(tag: i32) -> Result<Self, KeyError> {
        match tag {
            0 => Ok(KeyType::Ed25519),
            1 => Ok(KeyType::Secp256k1),
            2 => Ok(KeyType::Gost),
            3 => Ok(KeyType::Gost2012),
            other => Err(KeyError::UnknownKeyType(other.to_string())),
        }
    }

    /// Numeric tag.
    pub fn tag(self) -> i32 {
        self as i32
    }

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::Secp256k1 => "secp256k1",
            KeyType::Gost => "gost",
            KeyType::Gost2012 => "gost2012",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(KeyType::Ed25519),
            "secp256k1" | "ecdsa" => Ok(KeyType::Secp256k1),
            "gost" => Ok(KeyType::Gost),
            "gost2012" => Ok(KeyType::Gost2012),
            other => Err(KeyError::UnknownKeyType(other.to_string())),
        }
    }
}

/// A public key with its scheme.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    key_type: KeyType,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wraps raw key bytes without validating them against the curve.
    /// Verification rejects malformed points later.
    pub fn new(key_type: KeyType, bytes: Vec<u8>) -> Self {
        Self { key_type, bytes }
    }

    /// Decodes a base58 key.
    pub fn from_base58(key_type: KeyType, text: &str) -> Result<Self, KeyError> {
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
        Ok(Self::new(key_type, bytes))
    }

    /// Scheme tag.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base58 text, as carried in signed envelopes.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.bytes).into_string()
    }

    /// Address of this key.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {})", self.key_type, self.to_base58())
    }
}

/// A signing keypair. Only schemes with a library signer can be generated.
#[derive(Clone)]
pub enum Keypair {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
}

impl Keypair {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate(key_type: KeyType) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => Ok(Keypair::Ed25519(ed25519_dalek::SigningKey::generate(
                &mut OsRng,
            ))),
            KeyType::Secp256k1 => Ok(Keypair::Secp256k1(k256::ecdsa::SigningKey::random(
                &mut OsRng,
            ))),
            other => Err(KeyError::GenerationUnsupported(other)),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Handy in tests and for
    /// keys derived by a KDF.
    pub fn from_seed(key_type: KeyType, seed: &[u8; 32]) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => Ok(Keypair::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                seed,
            ))),
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::from_slice(seed)
                .map(Keypair::Secp256k1)
                .map_err(|_| KeyError::InvalidSecretKey(key_type)),
            other => Err(KeyError::GenerationUnsupported(other)),
        }
    }

    /// Scheme of this keypair.
    pub fn key_type(&self) -> KeyType {
        match self {
            Keypair::Ed25519(_) => KeyType::Ed25519,
            Keypair::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    /// Public half.
    pub fn public_key(&self) -> PublicKey {
        match self {
            Keypair::Ed25519(sk) => {
                PublicKey::new(KeyType::Ed25519, sk.verifying_key().to_bytes().to_vec())
            }
            Keypair::Secp256k1(sk) => PublicKey::new(
                KeyType::Secp256k1,
                sk.verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec(),
            ),
        }
    }

    /// Signs a canonical message with the scheme's digest rules:
    /// Ed25519 signs `SHA3-256(message)`, secp256k1 signs the
    /// personal-message digest of `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Keypair::Ed25519(sk) => sk.sign(&sha3_256(message)).to_bytes().to_vec(),
            Keypair::Secp256k1(sk) => {
                let digest = eth_personal_digest(message);
                // Signing a 32-byte prehash with a valid key only fails on a
                // negligible-probability zero nonce; an empty signature then
                // simply fails verification.
                let sig: Result<k256::ecdsa::Signature, _> = sk.sign_prehash(&digest);
                sig.map(|s| s.to_bytes().to_vec()).unwrap_or_default()
            }
        }
    }

    /// Secret key bytes. Handle with care.
    pub fn secret_bytes(&self) -> Vec<u8> {
        match self {
            Keypair::Ed25519(sk) => sk.to_bytes().to_vec(),
            Keypair::Secp256k1(sk) => sk.to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
