//! # Addresses
//!
//! An address is 32 bytes. For a single key it is `SHA3-256(public_key)`;
//! for a multi-signature account it is the SHA3-256 of the component keys
//! sorted by byte order and concatenated, so the same key set always maps
//! to the same address no matter the order the signer lists them in.
//!
//! The text form is base58-check: the first byte acts as the version
//! prefix, the remaining 31 bytes are the payload, and four bytes of
//! double-SHA-256 checksum follow. Byte-for-byte that is
//! `base58(address || sha256d(address)[..4])`.
//!
//! Addresses that came out of the ACL carry a user id. That asymmetry is
//! modelled by [`AccountRef`] rather than an optional field, so code that
//! needs "same user" semantics has to say which kind it holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::crypto::hash::sha3_256;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 32;

/// Errors parsing addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The text is not base58 or the checksum does not match.
    #[error("invalid address {text:?}: {reason}")]
    InvalidText {
        /// Offending input.
        text: String,
        /// Decoder message.
        reason: String,
    },

    /// Decoded payload has the wrong length.
    #[error("invalid address length: expected {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte ledger address.
#[derive(Clone, Copy, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wraps raw bytes.
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Wraps a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Derives the address of a single public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(sha3_256(public_key))
    }

    /// Derives a multi-signature address from an unordered key set.
    pub fn multisig<K: AsRef<[u8]>>(public_keys: &[K]) -> Self {
        let mut keys: Vec<&[u8]> = public_keys.iter().map(|k| k.as_ref()).collect();
        keys.sort_unstable();
        let joined: Vec<u8> = keys.concat();
        Self(sha3_256(&joined))
    }

    /// Parses base58-check text.
    pub fn from_base58check(text: &str) -> Result<Self, AddressError> {
        let decoded = bs58::decode(text)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidText {
                text: text.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_slice(&decoded)
    }

    /// Renders base58-check text.
    pub fn to_base58check(&self) -> String {
        bs58::encode(self.0).with_check().into_string()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        // Accumulate over every byte so the comparison time does not depend
        // on where the first difference is.
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for Address {}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58check())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58check())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58check(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58check())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::from_base58check(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AccountRef
// ---------------------------------------------------------------------------

/// An address, optionally resolved against the ACL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountRef {
    /// Only the bytes are known (e.g. a recipient named in arguments).
    Unresolved {
        /// The address.
        address: Address,
    },
    /// The ACL vouched for this address and its owner.
    Resolved {
        /// The address.
        address: Address,
        /// Opaque owner id from the ACL binding.
        user_id: String,
    },
}

impl AccountRef {
    /// An address without ACL context.
    pub fn unresolved(address: Address) -> Self {
        AccountRef::Unresolved { address }
    }

    /// An address with its ACL user id.
    pub fn resolved(address: Address, user_id: impl Into<String>) -> Self {
        AccountRef::Resolved {
            address,
            user_id: user_id.into(),
        }
    }

    /// The underlying address.
    pub fn address(&self) -> &Address {
        match self {
            AccountRef::Unresolved { address } | AccountRef::Resolved { address, .. } => address,
        }
    }

    /// The user id, if resolved and non-empty.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AccountRef::Resolved { user_id, .. } if !user_id.is_empty() => Some(user_id),
            _ => None,
        }
    }

    /// Two references belong to the same user iff both carry the same,
    /// non-empty user id.
    pub fn same_user(&self, other: &AccountRef) -> bool {
        matches!((self.user_id(), other.user_id()), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.address(), f)
    }
}
