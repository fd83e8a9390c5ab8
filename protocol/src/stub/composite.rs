//! Composite keys.
//!
//! A composite key is an object type followed by attributes, each
//! terminated by the host's reserved separator:
//!
//! ```text
//! \0 objectType \0 attr1 \0 attr2 \0 ... attrN \0
//! ```
//!
//! The leading separator keeps composite keys out of the plain-key space.
//! A partial key (object type plus a prefix of the attributes) addresses a
//! contiguous range that ends at the same prefix followed by U+10FFFF.

use super::{ChaincodeStub, Page};
use crate::error::{LedgerError, LedgerResult};

/// Separator between components.
pub const SEPARATOR: char = '\u{0000}';

/// Largest code point; terminates partial-key ranges.
pub const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

fn validate(component: &str) -> LedgerResult<()> {
    if component.contains(SEPARATOR) || component.contains(MAX_UNICODE_RUNE) {
        return Err(LedgerError::Malformed(format!(
            "composite key component {:?} contains a reserved character",
            component
        )));
    }
    Ok(())
}

/// Builds a composite key. Components must not contain the reserved
/// characters; the object type must not be empty.
pub fn create_composite_key<S: AsRef<str>>(
    object_type: &str,
    attributes: &[S],
) -> LedgerResult<String> {
    if object_type.is_empty() {
        return Err(LedgerError::Malformed("empty composite key object type".into()));
    }
    validate(object_type)?;

    let mut key = String::with_capacity(
        2 + object_type.len() + attributes.iter().map(|a| a.as_ref().len() + 1).sum::<usize>(),
    );
    key.push(SEPARATOR);
    key.push_str(object_type);
    key.push(SEPARATOR);
    for attr in attributes {
        let attr = attr.as_ref();
        validate(attr)?;
        key.push_str(attr);
        key.push(SEPARATOR);
    }
    Ok(key)
}

/// Splits a composite key into its object type and attributes.
pub fn split_composite_key(key: &str) -> LedgerResult<(String, Vec<String>)> {
    let body = key
        .strip_prefix(SEPARATOR)
        .and_then(|rest| rest.strip_suffix(SEPARATOR))
        .ok_or_else(|| LedgerError::Malformed(format!("{:?} is not a composite key", key)))?;

    let mut parts = body.split(SEPARATOR).map(str::to_string);
    let object_type = parts.next().unwrap_or_default();
    Ok((object_type, parts.collect()))
}

/// `[start, end)` covering every key that extends the partial key.
pub fn partial_key_range<S: AsRef<str>>(
    object_type: &str,
    attributes: &[S],
) -> LedgerResult<(String, String)> {
    let start = create_composite_key(object_type, attributes)?;
    let mut end = start.clone();
    end.push(MAX_UNICODE_RUNE);
    Ok((start, end))
}

/// Every entry under a partial composite key.
pub fn range_by_partial_key<S: AsRef<str>>(
    stub: &dyn ChaincodeStub,
    object_type: &str,
    attributes: &[S],
) -> LedgerResult<Vec<(String, Vec<u8>)>> {
    let (start, end) = partial_key_range(object_type, attributes)?;
    stub.range(&start, &end)
}

/// One page of entries under a partial composite key.
pub fn range_by_partial_key_paginated<S: AsRef<str>>(
    stub: &dyn ChaincodeStub,
    object_type: &str,
    attributes: &[S],
    page_size: u32,
    bookmark: &str,
) -> LedgerResult<Page<(String, Vec<u8>)>> {
    let (start, end) = partial_key_range(object_type, attributes)?;
    stub.range_paginated(&start, &end, page_size, bookmark)
}
