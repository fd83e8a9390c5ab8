//! # Non-negative big integers
//!
//! Balances, emission counters, fee floors and caps are all arbitrary
//! precision. [`BigInt`] wraps `num_bigint::BigUint` and adds the ledger's
//! conventions:
//!
//! - JSON is always a quoted decimal (`"1000"`) so consumers with 53-bit
//!   floats read it losslessly. Deserialisation also accepts a bare number.
//! - Storage bytes are big-endian magnitude with zero encoded as the empty
//!   byte string, which is what existing deployments already hold.
//! - Subtraction is checked. There is no negative value to fall back to.

use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Failures parsing or computing big integers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BigIntError {
    /// The input is not a decimal integer.
    #[error("invalid decimal integer: {0:?}")]
    InvalidDecimal(String),

    /// The value or result would be negative.
    #[error("negative value")]
    Negative,

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Arbitrary-precision non-negative integer.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BigInt(BigUint);

impl BigInt {
    /// Zero.
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    /// Returns `true` for zero.
    pub fn is_zero(&self) -> bool {
        self.0.bits() == 0
    }

    /// Parses a decimal string. A leading `-` is reported as
    /// [`BigIntError::Negative`], a leading `+` is accepted.
    pub fn parse_decimal(s: &str) -> Result<Self, BigIntError> {
        let trimmed = s.trim();
        if let Some(rest) = trimmed.strip_prefix('-') {
            // "-0" is still zero, anything else is negative.
            if !rest.is_empty() && rest.bytes().all(|b| b == b'0') {
                return Ok(Self::zero());
            }
            return Err(BigIntError::Negative);
        }
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BigIntError::InvalidDecimal(s.to_string()));
        }
        BigUint::parse_bytes(digits.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| BigIntError::InvalidDecimal(s.to_string()))
    }

    /// Decodes storage bytes (big-endian magnitude, empty = zero).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Encodes for storage (big-endian magnitude, zero = empty).
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    /// `self - rhs`, failing instead of going negative.
    pub fn checked_sub(&self, rhs: &BigInt) -> Result<BigInt, BigIntError> {
        if self.0 < rhs.0 {
            return Err(BigIntError::Negative);
        }
        Ok(Self(&self.0 - &rhs.0))
    }

    /// Integer division.
    pub fn checked_div(&self, rhs: &BigInt) -> Result<BigInt, BigIntError> {
        if rhs.is_zero() {
            return Err(BigIntError::DivisionByZero);
        }
        Ok(Self(&self.0 / &rhs.0))
    }

    /// Remainder.
    pub fn checked_rem(&self, rhs: &BigInt) -> Result<BigInt, BigIntError> {
        if rhs.is_zero() {
            return Err(BigIntError::DivisionByZero);
        }
        Ok(Self(&self.0 % &rhs.0))
    }

    /// `self * num / den`, truncating. Used for fee and rate math.
    pub fn mul_div(&self, num: &BigInt, den: &BigInt) -> Result<BigInt, BigIntError> {
        if den.is_zero() {
            return Err(BigIntError::DivisionByZero);
        }
        Ok(Self(&self.0 * &num.0 / &den.0))
    }

    /// Clamps into `[floor, cap]`; a zero cap means "no cap".
    pub fn clamp_between(self, floor: &BigInt, cap: &BigInt) -> BigInt {
        let mut value = self;
        if !cap.is_zero() && value > *cap {
            value = cap.clone();
        }
        if value < *floor {
            value = floor.clone();
        }
        value
    }

    /// Lossy conversion for logging and small counters.
    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(&self.0).ok()
    }
}

impl From<u64> for BigInt {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl FromStr for BigInt {
    type Err = BigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_decimal(s)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for &BigInt {
    type Output = BigInt;

    fn add(self, rhs: &BigInt) -> BigInt {
        BigInt(&self.0 + &rhs.0)
    }
}

impl Add for BigInt {
    type Output = BigInt;

    fn add(self, rhs: BigInt) -> BigInt {
        BigInt(self.0 + rhs.0)
    }
}

impl Mul for &BigInt {
    type Output = BigInt;

    fn mul(self, rhs: &BigInt) -> BigInt {
        BigInt(&self.0 * &rhs.0)
    }
}

impl std::iter::Sum for BigInt {
    fn sum<I: Iterator<Item = BigInt>>(iter: I) -> Self {
        iter.fold(BigInt::zero(), |acc, v| acc + v)
    }
}

impl Serialize for BigInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct BigIntVisitor;

impl<'de> Visitor<'de> for BigIntVisitor {
    type Value = BigInt;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative decimal integer, quoted or bare")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BigInt, E> {
        BigInt::parse_decimal(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigInt, E> {
        Ok(BigInt::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigInt, E> {
        u64::try_from(v)
            .map(BigInt::from)
            .map_err(|_| E::custom(BigIntError::Negative))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<BigInt, E> {
        BigInt::parse_decimal(&v.to_string()).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<BigInt, E> {
        Err(E::custom(format!("expected an integer, got {}", v)))
    }
}

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BigIntVisitor)
    }
}
