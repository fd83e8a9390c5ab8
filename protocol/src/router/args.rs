//! Argument decoding.
//!
//! Host arguments are byte strings. A handler parameter type says how to
//! turn one into a value by implementing [`Param`]; most implementations
//! walk the same decoder chain and keep the first success:
//!
//! 1. literal pass-through (text parameters),
//! 2. JSON, when the input is syntactically valid JSON,
//! 3. the type's text form (`FromStr`),
//! 4. binary protobuf (for protobuf messages),
//! 5. the generic binary encoding (`bincode`).
//!
//! When nothing accepts the input the invocation fails with
//! `unsupported argument type`, carrying the last decoder's complaint.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use crate::crypto::keys::KeyType;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{Address, BigInt};

type Step<T> = fn(&[u8]) -> Result<T, String>;

/// A type that can be decoded from one host argument.
pub trait Param: Sized {
    /// Name used in error messages.
    const TYPE_NAME: &'static str;

    fn decode(raw: &[u8]) -> Result<Self, String>;
}

/// Decodes argument `index` or fails with `unsupported argument type`.
pub fn decode_arg<T: Param>(raw: &[u8], index: usize) -> LedgerResult<T> {
    T::decode(raw).map_err(|reason| LedgerError::UnsupportedArgument {
        index,
        expected: T::TYPE_NAME,
        reason,
    })
}

/// Serialises a handler result. Unit results produce an empty payload.
pub fn encode_output<R: Serialize>(value: &R) -> LedgerResult<Vec<u8>> {
    let bytes = serde_json::to_vec(value).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    if bytes == b"null" {
        Ok(Vec::new())
    } else {
        Ok(bytes)
    }
}

fn chain<T>(raw: &[u8], steps: &[Step<T>]) -> Result<T, String> {
    let mut last = String::from("no decoder");
    for step in steps {
        match step(raw) {
            Ok(value) => return Ok(value),
            Err(e) => last = e,
        }
    }
    Err(last)
}

fn utf8(raw: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(raw).map_err(|_| "not UTF-8".to_string())
}

fn is_json(raw: &[u8]) -> bool {
    serde_json::from_slice::<IgnoredAny>(raw).is_ok()
}

fn json_if_valid<T: DeserializeOwned>(raw: &[u8]) -> Result<T, String> {
    if !is_json(raw) {
        return Err("not JSON".into());
    }
    serde_json::from_slice(raw).map_err(|e| e.to_string())
}

fn text<T>(raw: &[u8]) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    utf8(raw)?.parse().map_err(|e: T::Err| e.to_string())
}

fn protobuf<T: prost::Message + Default>(raw: &[u8]) -> Result<T, String> {
    T::decode(raw).map_err(|e| e.to_string())
}

fn binary<T: DeserializeOwned>(raw: &[u8]) -> Result<T, String> {
    bincode::deserialize(raw).map_err(|e| e.to_string())
}

impl Param for String {
    const TYPE_NAME: &'static str = "string";

    fn decode(raw: &[u8]) -> Result<Self, String> {
        utf8(raw).map(str::to_string)
    }
}

macro_rules! text_param {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Param for $ty {
                const TYPE_NAME: &'static str = $name;

                fn decode(raw: &[u8]) -> Result<Self, String> {
                    chain(raw, &[json_if_valid::<$ty>, text::<$ty>])
                }
            }
        )*
    };
}

text_param! {
    u64 => "uint64",
    u32 => "uint32",
    i64 => "int64",
    bool => "bool",
    BigInt => "bigint",
    Address => "address",
    KeyType => "key type",
}

impl<T: Param> Param for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    /// Empty input is `None`.
    fn decode(raw: &[u8]) -> Result<Self, String> {
        if raw.is_empty() {
            Ok(None)
        } else {
            T::decode(raw).map(Some)
        }
    }
}

/// A serde value passed as JSON, or in the generic binary encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: DeserializeOwned> Param for Json<T> {
    const TYPE_NAME: &'static str = "json";

    fn decode(raw: &[u8]) -> Result<Self, String> {
        chain(raw, &[json_if_valid::<T>, binary::<T>]).map(Json)
    }
}

/// A protobuf message passed as canonical JSON or as binary protobuf.
#[derive(Debug, Clone, PartialEq)]
pub struct Proto<T>(pub T);

impl<T> Param for Proto<T>
where
    T: prost::Message + DeserializeOwned + Default,
{
    const TYPE_NAME: &'static str = "protobuf message";

    fn decode(raw: &[u8]) -> Result<Self, String> {
        chain(raw, &[json_if_valid::<T>, protobuf::<T>]).map(Proto)
    }
}
