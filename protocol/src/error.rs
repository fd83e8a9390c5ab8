//! Error types for the contract core.
//!
//! Every fallible operation in the crate returns a [`LedgerError`]. The
//! variants are grouped by [`ErrorKind`], which is what the pipeline and the
//! batch executor use to decide whether a failure stays local to a task or
//! aborts the whole invocation. The `Display` text of each variant is what
//! the host sees in the response message, so domain messages are kept stable.

use thiserror::Error;

use crate::crypto::keys::KeyError;
use crate::types::address::AddressError;
use crate::types::bigint::BigIntError;

/// Shorthand used across the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input rejected before any state read.
    Decoding,
    /// Unknown key, bad signature, blocked account or missing right.
    Authentication,
    /// Nonce reuse or a nonce that fell out of the window.
    Replay,
    /// Business rule violation raised by a handler.
    Domain,
    /// Stub or cross-contract failure. Aborts the invocation.
    Infrastructure,
    /// Broken internal invariant. Aborts and is logged loudly.
    Fatal,
}

/// Errors raised by the contract core.
#[derive(Debug, Error)]
pub enum LedgerError {
    // -- Decoding -----------------------------------------------------------
    /// No decoder in the chain accepted the argument.
    #[error("unsupported argument type: argument {index} is not a valid {expected}: {reason}")]
    UnsupportedArgument {
        /// Zero-based position among the method arguments.
        index: usize,
        /// Name of the target type.
        expected: &'static str,
        /// Error reported by the last decoder tried.
        reason: String,
    },

    /// The number of arguments does not match the method signature.
    #[error("wrong argument count for {method}: expected {expected}, got {got}")]
    WrongArgumentCount {
        /// Method name.
        method: String,
        /// Arguments the handler takes.
        expected: usize,
        /// Arguments supplied.
        got: usize,
    },

    /// The invocation names a function the router does not know.
    #[error("method not found: {0}")]
    UnknownMethod(String),

    /// Structurally invalid input (bad JSON, bad protobuf, bad envelope).
    #[error("malformed input: {0}")]
    Malformed(String),

    // -- Authentication -----------------------------------------------------
    /// The signature does not verify over the canonical message.
    #[error("invalid signature")]
    InvalidSignature,

    /// The ACL does not know the presented key set.
    #[error("unknown public key: {0}")]
    UnknownKey(String),

    /// The signed envelope names a different channel.
    #[error("channel mismatch: envelope names {got}, invocation runs on {expected}")]
    ChannelMismatch {
        /// Channel of the current invocation.
        expected: String,
        /// Channel named in the envelope.
        got: String,
    },

    /// The signed envelope names a different chaincode.
    #[error("chaincode mismatch: envelope names {got}, invocation runs as {expected}")]
    ChaincodeMismatch {
        /// Chaincode of the current invocation.
        expected: String,
        /// Chaincode named in the envelope.
        got: String,
    },

    /// The sender account is blacklisted.
    #[error("address {0} is blacklisted")]
    Blacklisted(String),

    /// The sender account is graylisted and may not write.
    #[error("address {0} is graylisted")]
    Graylisted(String),

    /// The sender lacks the right or role for this operation.
    #[error("unauthorized")]
    Unauthorized,

    /// A key type the signature suite cannot verify.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Key material failed to parse.
    #[error(transparent)]
    Key(#[from] KeyError),

    // -- Replay -------------------------------------------------------------
    /// The nonce is already in the sender's window.
    #[error("nonce already used: {0}")]
    NonceAlreadyUsed(u64),

    /// The nonce is not newer than the oldest retained nonce.
    #[error("nonce too old: {nonce} is not above {oldest}")]
    NonceTooOld {
        /// Rejected nonce.
        nonce: u64,
        /// Oldest nonce in the full window.
        oldest: u64,
    },

    /// The nonce lies outside the accepted numeric range.
    #[error("nonce out of range: {0}")]
    NonceOutOfRange(u64),

    // -- Domain -------------------------------------------------------------
    /// A debit would make a balance negative.
    #[error("insufficient balance: {namespace} {address} {token} has {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance namespace name.
        namespace: String,
        /// Address text.
        address: String,
        /// Token component of the key.
        token: String,
        /// Current balance.
        available: String,
        /// Amount requested.
        requested: String,
    },

    /// Zero amounts are rejected on every path.
    #[error("amount should be more than zero")]
    ZeroAmount,

    /// The amount falls outside the configured min/max.
    #[error("amount out of limits")]
    AmountOutOfLimits,

    /// `init` ran twice.
    #[error("already initialized")]
    AlreadyInitialized,

    /// A handler needed the token config before `init` ran.
    #[error("chaincode is not initialized")]
    NotInitialized,

    /// Business rule violation with a free-form message.
    #[error("{0}")]
    Domain(String),

    // -- Infrastructure -----------------------------------------------------
    /// The host stub reported an error.
    #[error("stub error: {0}")]
    Stub(String),

    /// A cross-chaincode call failed.
    #[error("cross-chaincode call to {chaincode} failed: {message}")]
    CrossCall {
        /// Target chaincode.
        chaincode: String,
        /// Message returned by the peer.
        message: String,
    },

    /// A handler invoked from a query tried to write.
    #[error("write attempted in read-only query")]
    ReadOnly,

    /// Encoding a value for storage failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Fatal --------------------------------------------------------------
    /// An internal invariant does not hold.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl LedgerError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            UnsupportedArgument { .. } | WrongArgumentCount { .. } | UnknownMethod(_)
            | Malformed(_) => ErrorKind::Decoding,
            InvalidSignature | UnknownKey(_) | ChannelMismatch { .. }
            | ChaincodeMismatch { .. } | Blacklisted(_) | Graylisted(_) | Unauthorized
            | UnsupportedKeyType(_) | Key(_) => ErrorKind::Authentication,
            NonceAlreadyUsed(_) | NonceTooOld { .. } | NonceOutOfRange(_) => ErrorKind::Replay,
            InsufficientBalance { .. } | ZeroAmount | AmountOutOfLimits | AlreadyInitialized
            | NotInitialized | Domain(_) => ErrorKind::Domain,
            Stub(_) | CrossCall { .. } | ReadOnly | Serialization(_) => {
                ErrorKind::Infrastructure
            }
            Invariant(_) => ErrorKind::Fatal,
        }
    }

    /// Returns `true` if this error must abort the whole invocation, even
    /// inside a batch.
    pub fn is_fatal_for_batch(&self) -> bool {
        // A read-only violation inside a task is the task's own bug.
        matches!(self.kind(), ErrorKind::Infrastructure | ErrorKind::Fatal)
            && !matches!(self, LedgerError::ReadOnly)
    }

    /// Convenience constructor for free-form domain errors.
    pub fn domain(msg: impl Into<String>) -> Self {
        LedgerError::Domain(msg.into())
    }
}

impl From<BigIntError> for LedgerError {
    fn from(e: BigIntError) -> Self {
        match e {
            BigIntError::Negative => LedgerError::domain("amount must not be negative"),
            other => LedgerError::Malformed(other.to_string()),
        }
    }
}

impl From<AddressError> for LedgerError {
    fn from(e: AddressError) -> Self {
        LedgerError::Malformed(e.to_string())
    }
}

impl From<prost::DecodeError> for LedgerError {
    fn from(e: prost::DecodeError) -> Self {
        LedgerError::Malformed(format!("protobuf: {}", e))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Malformed(format!("json: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_messages_are_stable() {
        assert_eq!(LedgerError::ZeroAmount.to_string(), "amount should be more than zero");
        assert_eq!(LedgerError::AmountOutOfLimits.to_string(), "amount out of limits");
        assert_eq!(LedgerError::Unauthorized.to_string(), "unauthorized");
        assert!(LedgerError::NonceAlreadyUsed(7)
            .to_string()
            .starts_with("nonce already used"));
    }

    #[test]
    fn insufficient_balance_message_prefix() {
        let err = LedgerError::InsufficientBalance {
            namespace: "Token".into(),
            address: "addr".into(),
            token: "".into(),
            available: "1".into(),
            requested: "2".into(),
        };
        assert!(err.to_string().starts_with("insufficient balance"));
        assert_eq!(err.kind(), ErrorKind::Domain);
    }

    #[test]
    fn kinds_drive_batch_abort() {
        assert!(LedgerError::Stub("io".into()).is_fatal_for_batch());
        assert!(LedgerError::Invariant("x".into()).is_fatal_for_batch());
        assert!(!LedgerError::ReadOnly.is_fatal_for_batch());
        assert!(!LedgerError::InvalidSignature.is_fatal_for_batch());
        assert!(!LedgerError::ZeroAmount.is_fatal_for_batch());
    }

    #[test]
    fn unsupported_argument_mentions_type() {
        let err = LedgerError::UnsupportedArgument {
            index: 1,
            expected: "bigint",
            reason: "bad digit".into(),
        };
        assert!(err.to_string().starts_with("unsupported argument type"));
        assert_eq!(err.kind(), ErrorKind::Decoding);
    }
}
