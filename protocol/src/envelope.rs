//! # Invocation Envelopes
//!
//! Argument layouts of deferred and signed invocations, as the host
//! receives them:
//!
//! ```text
//! signed:   [method, requestId, channel, chaincode, arg1..argN, nonce, pk1..pkK, sig1..sigK]
//! unsigned: [method, requestId, channel, chaincode, arg1..argN]
//! ```
//!
//! `N` is fixed by the handler signature, so `K` follows from the total
//! length. Public keys and signatures are base58 text. The message every
//! signer signs is the concatenation of everything before the signatures.
//!
//! Clients build envelopes with [`SignedEnvelope::sign`]; the pipeline
//! takes them apart with [`SignedEnvelope::parse`].

use crate::crypto::keys::Keypair;
use crate::crypto::signatures::compose_message;
use crate::error::{LedgerError, LedgerResult};
use crate::stub::arg_text;

/// Fields preceding the method arguments: requestId, channel, chaincode.
const HEADER_LEN: usize = 3;

fn texts(method: &str, rest: &[Vec<u8>]) -> LedgerResult<Vec<String>> {
    (0..rest.len())
        .map(|i| {
            arg_text(rest, i).map(str::to_string).map_err(|_| {
                LedgerError::Malformed(format!("{}: envelope field {} is not UTF-8", method, i + 1))
            })
        })
        .collect()
}

fn check_target(
    channel: &str,
    chaincode: &str,
    expected_channel: &str,
    expected_chaincode: &str,
) -> LedgerResult<()> {
    if channel != expected_channel {
        return Err(LedgerError::ChannelMismatch {
            expected: expected_channel.to_string(),
            got: channel.to_string(),
        });
    }
    if chaincode != expected_chaincode {
        return Err(LedgerError::ChaincodeMismatch {
            expected: expected_chaincode.to_string(),
            got: chaincode.to_string(),
        });
    }
    Ok(())
}

/// A signed invocation, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub method: String,
    pub request_id: String,
    pub channel: String,
    pub chaincode: String,
    pub args: Vec<String>,
    pub nonce: String,
    pub public_keys: Vec<String>,
    pub signatures: Vec<String>,
}

impl SignedEnvelope {
    /// Splits `rest` (the arguments after the function name) for a handler
    /// taking `arity` arguments.
    pub fn parse(method: &str, rest: &[Vec<u8>], arity: usize) -> LedgerResult<Self> {
        let fixed = HEADER_LEN + arity + 1;
        let extra = rest.len().checked_sub(fixed).unwrap_or(0);
        if rest.len() < fixed + 2 || extra % 2 != 0 {
            return Err(LedgerError::Malformed(format!(
                "{}: signed envelope needs {} fields plus key/signature pairs, got {}",
                method,
                fixed,
                rest.len()
            )));
        }
        let signers = extra / 2;

        let mut fields = texts(method, rest)?.into_iter();
        let mut take = |n: usize| -> Vec<String> { fields.by_ref().take(n).collect() };

        let header = take(HEADER_LEN);
        let args = take(arity);
        let nonce = take(1).pop().unwrap_or_default();
        let public_keys = take(signers);
        let signatures = take(signers);
        let [request_id, channel, chaincode]: [String; HEADER_LEN] = header
            .try_into()
            .map_err(|_| LedgerError::Malformed(format!("{}: truncated envelope header", method)))?;

        Ok(Self {
            method: method.to_string(),
            request_id,
            channel,
            chaincode,
            args,
            nonce,
            public_keys,
            signatures,
        })
    }

    /// Canonical message covered by every signature.
    pub fn message(&self) -> Vec<u8> {
        let mut parts: Vec<&str> = Vec::with_capacity(5 + self.args.len() + self.public_keys.len());
        parts.push(&self.method);
        parts.push(&self.request_id);
        parts.push(&self.channel);
        parts.push(&self.chaincode);
        parts.extend(self.args.iter().map(String::as_str));
        parts.push(&self.nonce);
        parts.extend(self.public_keys.iter().map(String::as_str));
        compose_message(&parts)
    }

    /// Rejects envelopes addressed to another channel or chaincode.
    pub fn check_target(&self, channel: &str, chaincode: &str) -> LedgerResult<()> {
        check_target(&self.channel, &self.chaincode, channel, chaincode)
    }

    /// Decoded signatures, in key order.
    pub fn signature_bytes(&self) -> LedgerResult<Vec<Vec<u8>>> {
        self.signatures
            .iter()
            .map(|s| {
                bs58::decode(s)
                    .into_vec()
                    .map_err(|e| LedgerError::Malformed(format!("signature is not base58: {}", e)))
            })
            .collect()
    }

    /// Builds and signs an envelope with every keypair in `signers`.
    pub fn sign(
        method: &str,
        request_id: &str,
        channel: &str,
        chaincode: &str,
        args: Vec<String>,
        nonce: u64,
        signers: &[&Keypair],
    ) -> Self {
        let mut envelope = Self {
            method: method.to_string(),
            request_id: request_id.to_string(),
            channel: channel.to_string(),
            chaincode: chaincode.to_string(),
            args,
            nonce: nonce.to_string(),
            public_keys: signers.iter().map(|k| k.public_key().to_base58()).collect(),
            signatures: Vec::new(),
        };
        let message = envelope.message();
        envelope.signatures = signers
            .iter()
            .map(|k| bs58::encode(k.sign(&message)).into_string())
            .collect();
        envelope
    }

    /// Everything after the function name, as the host would pass it.
    pub fn tail(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(4 + self.args.len() + 2 * self.public_keys.len());
        out.push(self.request_id.clone().into_bytes());
        out.push(self.channel.clone().into_bytes());
        out.push(self.chaincode.clone().into_bytes());
        out.extend(self.args.iter().map(|a| a.clone().into_bytes()));
        out.push(self.nonce.clone().into_bytes());
        out.extend(self.public_keys.iter().map(|k| k.clone().into_bytes()));
        out.extend(self.signatures.iter().map(|s| s.clone().into_bytes()));
        out
    }

    /// Full host argument vector: the function name followed by [`tail`](Self::tail).
    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let mut out = vec![self.method.clone().into_bytes()];
        out.extend(self.tail());
        out
    }
}

/// An unsigned deferred invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEnvelope {
    pub method: String,
    pub request_id: String,
    pub channel: String,
    pub chaincode: String,
    pub args: Vec<String>,
}

impl UnsignedEnvelope {
    pub fn parse(method: &str, rest: &[Vec<u8>], arity: usize) -> LedgerResult<Self> {
        if rest.len() != HEADER_LEN + arity {
            return Err(LedgerError::WrongArgumentCount {
                method: method.to_string(),
                expected: HEADER_LEN + arity,
                got: rest.len(),
            });
        }
        let mut fields = texts(method, rest)?;
        let args = fields.split_off(HEADER_LEN);
        let [request_id, channel, chaincode]: [String; HEADER_LEN] = fields
            .try_into()
            .map_err(|_| LedgerError::Malformed(format!("{}: truncated envelope header", method)))?;
        Ok(Self {
            method: method.to_string(),
            request_id,
            channel,
            chaincode,
            args,
        })
    }

    pub fn check_target(&self, channel: &str, chaincode: &str) -> LedgerResult<()> {
        check_target(&self.channel, &self.chaincode, channel, chaincode)
    }

    pub fn to_args(&self) -> Vec<Vec<u8>> {
        let mut out = vec![
            self.method.clone().into_bytes(),
            self.request_id.clone().into_bytes(),
            self.channel.clone().into_bytes(),
            self.chaincode.clone().into_bytes(),
        ];
        out.extend(self.args.iter().map(|a| a.clone().into_bytes()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyType;
    use crate::crypto::signatures::SchemeRegistry;
    use crate::crypto::PublicKey;

    fn keypair(seed: u8) -> Keypair {
        Keypair::from_seed(KeyType::Ed25519, &[seed; 32]).unwrap()
    }

    #[test]
    fn sign_then_parse() {
        let kp = keypair(1);
        let env = SignedEnvelope::sign(
            "emit",
            "req",
            "fiat",
            "fiat",
            vec!["addr".into(), "10".into()],
            1_700_000_000_000,
            &[&kp],
        );
        let args = env.to_args();
        let parsed = SignedEnvelope::parse("emit", &args[1..], 2).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.public_keys.len(), 1);
        parsed.check_target("fiat", "fiat").unwrap();
        assert!(parsed.check_target("cc", "fiat").is_err());

        let pk = PublicKey::from_base58(KeyType::Ed25519, &parsed.public_keys[0]).unwrap();
        let sigs = parsed.signature_bytes().unwrap();
        assert!(SchemeRegistry::default().verify(&pk, &parsed.message(), &sigs[0]).unwrap());
    }

    #[test]
    fn multisig_layout_groups_keys_then_signatures() {
        let kps = [keypair(1), keypair(2), keypair(3)];
        let refs: Vec<&Keypair> = kps.iter().collect();
        let env = SignedEnvelope::sign("emit", "r", "c", "cc", vec!["a".into()], 1 << 41, &refs);
        let args = env.to_args();
        assert_eq!(args.len(), 1 + 3 + 1 + 1 + 3 + 3);
        let parsed = SignedEnvelope::parse("emit", &args[1..], 1).unwrap();
        assert_eq!(parsed.public_keys, env.public_keys);
        assert_eq!(parsed.signatures, env.signatures);
    }

    #[test]
    fn odd_tail_is_malformed() {
        let rest: Vec<Vec<u8>> = ["r", "c", "cc", "a", "1", "pk"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        assert!(SignedEnvelope::parse("m", &rest, 1).is_err());
        assert!(SignedEnvelope::parse("m", &rest[..4], 1).is_err());
    }

    #[test]
    fn message_excludes_signatures() {
        let kp = keypair(4);
        let mut env = SignedEnvelope::sign("m", "r", "c", "cc", vec![], 1 << 41, &[&kp]);
        let before = env.message();
        env.signatures = vec!["other".into()];
        assert_eq!(env.message(), before);
    }

    #[test]
    fn unsigned_parse_requires_exact_arity() {
        let env = UnsignedEnvelope {
            method: "m".into(),
            request_id: "r".into(),
            channel: "c".into(),
            chaincode: "cc".into(),
            args: vec!["x".into()],
        };
        let args = env.to_args();
        assert_eq!(UnsignedEnvelope::parse("m", &args[1..], 1).unwrap(), env);
        assert!(matches!(
            UnsignedEnvelope::parse("m", &args[1..], 2),
            Err(LedgerError::WrongArgumentCount { .. })
        ));
    }
}
