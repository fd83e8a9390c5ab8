//! # Signature verification
//!
//! A signed invocation is authenticated by recomposing the canonical message
//! and checking every presented signature against it:
//!
//! ```text
//! message = method ‖ requestId ‖ channel ‖ chaincode
//!         ‖ arg1 ‖ … ‖ argN ‖ nonce ‖ pk1 ‖ … ‖ pkK
//! ```
//!
//! with the public keys in their base58 text form. A single-signer envelope
//! is the `K = 1` case. Multi-signature envelopes need one valid signature
//! per declared key; there is no threshold below n-of-n.
//!
//! Verification is dispatched through a [`SchemeRegistry`] so deployments
//! that need GOST can register their own [`SignatureScheme`] without
//! touching the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::Verifier as _;
use k256::ecdsa::signature::hazmat::PrehashVerifier;

use super::hash::{eth_personal_digest, sha3_256};
use super::keys::{KeyType, PublicKey};
use crate::error::{LedgerError, LedgerResult};

/// Concatenates message parts in order.
pub fn compose_message<P: AsRef<[u8]>>(parts: &[P]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}

/// A verifier for one key type.
pub trait SignatureScheme: Send + Sync {
    /// Tag this scheme answers for.
    fn key_type(&self) -> KeyType;

    /// Returns `true` iff `signature` is valid for `message` under `public_key`.
    /// Malformed keys or signatures are simply invalid.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 over `SHA3-256(message)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn key_type(&self) -> KeyType {
        KeyType::Ed25519
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(pk_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(&pk_bytes) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        vk.verify(&sha3_256(message), &sig).is_ok()
    }
}

/// secp256k1 ECDSA over the personal-message digest. Accepts 64-byte
/// `r ‖ s` or 65-byte `r ‖ s ‖ v` signatures; `v` is ignored because the
/// key is known.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Scheme;

impl SignatureScheme for Secp256k1Scheme {
    fn key_type(&self) -> KeyType {
        KeyType::Secp256k1
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        if signature.len() != 64 && signature.len() != 65 {
            return false;
        }
        let Ok(vk) = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = k256::ecdsa::Signature::from_slice(&signature[..64]) else {
            return false;
        };
        // Wallets may hand us a high-s signature; normalise before checking.
        let sig = sig.normalize_s().unwrap_or(sig);
        vk.verify_prehash(&eth_personal_digest(message), &sig).is_ok()
    }
}

/// Key type → verifier table.
#[derive(Clone)]
pub struct SchemeRegistry {
    schemes: HashMap<KeyType, Arc<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    /// A registry with no schemes at all.
    pub fn empty() -> Self {
        Self {
            schemes: HashMap::new(),
        }
    }

    /// Adds or replaces the verifier for `scheme.key_type()`.
    pub fn register(&mut self, scheme: Arc<dyn SignatureScheme>) {
        self.schemes.insert(scheme.key_type(), scheme);
    }

    /// Returns `true` if a verifier is registered for `key_type`.
    pub fn supports(&self, key_type: KeyType) -> bool {
        self.schemes.contains_key(&key_type)
    }

    /// Verifies one signature.
    pub fn verify(
        &self,
        public_key: &PublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> LedgerResult<bool> {
        let scheme = self
            .schemes
            .get(&public_key.key_type())
            .ok_or_else(|| LedgerError::UnsupportedKeyType(public_key.key_type().to_string()))?;
        Ok(scheme.verify(public_key.as_bytes(), message, signature))
    }

    /// Verifies that every key in `keys` produced the matching entry of
    /// `signatures` over `message`.
    pub fn verify_all(
        &self,
        keys: &[PublicKey],
        message: &[u8],
        signatures: &[Vec<u8>],
    ) -> LedgerResult<()> {
        if keys.is_empty() || keys.len() != signatures.len() {
            return Err(LedgerError::InvalidSignature);
        }
        for (key, sig) in keys.iter().zip(signatures) {
            if !self.verify(key, message, sig)? {
                return Err(LedgerError::InvalidSignature);
            }
        }
        Ok(())
    }
}

impl Default for SchemeRegistry {
    /// Ed25519 and secp256k1. GOST verifiers must be registered explicitly.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Ed25519Scheme));
        registry.register(Arc::new(Secp256k1Scheme));
        registry
    }
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.schemes.keys().collect();
        types.sort();
        f.debug_struct("SchemeRegistry").field("schemes", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn message() -> Vec<u8> {
        compose_message(&["emit", "req-1", "fiat", "fiat", "addr", "1000", "1700000000000"])
    }

    #[test]
    fn ed25519_sign_verify() {
        let kp = Keypair::from_seed(KeyType::Ed25519, &[9; 32]).unwrap();
        let msg = message();
        let sig = kp.sign(&msg);
        let registry = SchemeRegistry::default();
        assert!(registry.verify(&kp.public_key(), &msg, &sig).unwrap());
        assert!(!registry.verify(&kp.public_key(), b"other", &sig).unwrap());
    }

    #[test]
    fn secp256k1_sign_verify() {
        let kp = Keypair::from_seed(KeyType::Secp256k1, &[7; 32]).unwrap();
        let msg = message();
        let sig = kp.sign(&msg);
        let registry = SchemeRegistry::default();
        assert!(registry.verify(&kp.public_key(), &msg, &sig).unwrap());

        let mut with_v = sig.clone();
        with_v.push(27);
        assert!(registry.verify(&kp.public_key(), &msg, &with_v).unwrap());

        let mut tampered = sig;
        tampered[10] ^= 1;
        assert!(!registry.verify(&kp.public_key(), &msg, &tampered).unwrap());
    }

    #[test]
    fn malformed_material_is_invalid_not_error() {
        let registry = SchemeRegistry::default();
        let pk = PublicKey::new(KeyType::Ed25519, vec![1, 2, 3]);
        assert!(!registry.verify(&pk, b"m", &[0; 64]).unwrap());
    }

    #[test]
    fn gost_without_verifier_is_unsupported() {
        let registry = SchemeRegistry::default();
        let pk = PublicKey::new(KeyType::Gost, vec![0; 64]);
        assert!(matches!(
            registry.verify(&pk, b"m", &[0; 64]),
            Err(LedgerError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn custom_scheme_can_be_plugged_in() {
        struct AcceptAll;
        impl SignatureScheme for AcceptAll {
            fn key_type(&self) -> KeyType {
                KeyType::Gost2012
            }
            fn verify(&self, _: &[u8], _: &[u8], sig: &[u8]) -> bool {
                sig == b"ok"
            }
        }
        let mut registry = SchemeRegistry::default();
        registry.register(Arc::new(AcceptAll));
        let pk = PublicKey::new(KeyType::Gost2012, vec![0; 64]);
        assert!(registry.verify(&pk, b"m", b"ok").unwrap());
        assert!(!registry.verify(&pk, b"m", b"no").unwrap());
    }

    #[test]
    fn verify_all_requires_every_signature() {
        let registry = SchemeRegistry::default();
        let kps: Vec<Keypair> = (1..=3u8)
            .map(|i| Keypair::from_seed(KeyType::Ed25519, &[i; 32]).unwrap())
            .collect();
        let keys: Vec<PublicKey> = kps.iter().map(|k| k.public_key()).collect();
        let msg = message();
        let mut sigs: Vec<Vec<u8>> = kps.iter().map(|k| k.sign(&msg)).collect();
        registry.verify_all(&keys, &msg, &sigs).unwrap();

        sigs.pop();
        assert!(registry.verify_all(&keys, &msg, &sigs).is_err());

        sigs.push(kps[0].sign(&msg));
        assert!(registry.verify_all(&keys, &msg, &sigs).is_err());
    }
}
