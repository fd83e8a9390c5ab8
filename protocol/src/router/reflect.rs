//! Name-prefix routing.
//!
//! A convenience over [`RouterBuilder::route`]: the handler's declared name
//! carries its classification.
//!
//! | Prefix  | Kind          | Auth     |
//! |---------|---------------|----------|
//! | `NBTx`  | `invoke-nbtx` | none     |
//! | `Tx`    | `invoke-tx`   | signed   |
//! | `Query` | `query`       | none     |
//!
//! The external name is the remainder with its first letter lowered, so
//! `TxSetFeeAddress` is reached as `setFeeAddress`.

use super::{AuthPolicy, Handler, MethodKind, RouterBuilder};
use crate::error::{LedgerError, LedgerResult};

const PREFIXES: &[(&str, MethodKind, AuthPolicy)] = &[
    ("NBTx", MethodKind::InvokeNbtx, AuthPolicy::None),
    ("Tx", MethodKind::InvokeTx, AuthPolicy::Signed),
    ("Query", MethodKind::Query, AuthPolicy::None),
];

/// Lowers the first character.
pub fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Splits a declared handler name into external name, kind and policy.
pub fn classify(declared: &str) -> LedgerResult<(String, MethodKind, AuthPolicy)> {
    for (prefix, kind, auth) in PREFIXES {
        if let Some(rest) = declared.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                return Ok((lower_camel(rest), *kind, *auth));
            }
        }
    }
    Err(LedgerError::Invariant(format!(
        "handler {} has no Tx, NBTx or Query prefix",
        declared
    )))
}

impl<C: 'static> RouterBuilder<C> {
    /// Registers `handler` under the route derived from `declared`.
    pub fn reflect<H, M>(mut self, declared: &str, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        match classify(declared) {
            Ok((name, kind, auth)) => self.route(&name, kind, auth, handler),
            Err(e) => {
                self.note_problem(e.to_string());
                self
            }
        }
    }
}
