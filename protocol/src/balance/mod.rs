//! # Balance Ledger
//!
//! Every balance lives under its own composite key:
//!
//! ```text
//! (balance, nsTag, holder, token) -> big-endian magnitude
//! ```
//!
//! `nsTag` is the namespace byte rendered as two hex digits. `holder` is an
//! address in base58-check form, or a channel name for the [`Given`]
//! counters. `token` is empty for the native token and carries a foreign
//! symbol (Allowed) or a group id (industrial tokens) otherwise.
//!
//! A missing key means zero, and a balance that reaches zero is deleted, so
//! there is never more than one record per triple and never a stored zero.
//! Debits are checked before anything is written: a failed
//! [`Balances::sub`] or [`Balances::transfer`] leaves the stub untouched.
//!
//! [`Given`]: Namespace::Given

pub mod accounting;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::KEY_BALANCE;
use crate::error::{LedgerError, LedgerResult};
use crate::stub::composite::{
    create_composite_key, range_by_partial_key, range_by_partial_key_paginated, split_composite_key,
};
use crate::stub::{ChaincodeStub, Page};
use crate::types::{Address, BigInt};

pub use accounting::{AccountingRecord, AccountingSink, MemorySink};

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

/// Balance category. The tag bytes are part of the persisted key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    /// Native balance of this contract's token.
    Token,
    /// Native balance reserved, e.g. for a pending redemption.
    TokenLocked,
    /// Foreign token credited through a transfer or swap.
    Allowed,
    /// Foreign balance reserved for an in-flight protocol.
    AllowedLocked,
    /// Amount sent out to another channel, keyed by that channel.
    Given,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::Token,
        Namespace::TokenLocked,
        Namespace::Allowed,
        Namespace::AllowedLocked,
        Namespace::Given,
    ];

    pub fn tag(self) -> u8 {
        match self {
            Namespace::Token => 0x2b,
            Namespace::TokenLocked => 0x2c,
            Namespace::Allowed => 0x2d,
            Namespace::AllowedLocked => 0x2e,
            Namespace::Given => 0x2f,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.tag() == tag)
    }

    /// Tag as it appears in the composite key.
    pub fn key_tag(self) -> String {
        format!("{:02x}", self.tag())
    }

    pub fn name(self) -> &'static str {
        match self {
            Namespace::Token => "Token",
            Namespace::TokenLocked => "TokenLocked",
            Namespace::Allowed => "Allowed",
            Namespace::AllowedLocked => "AllowedLocked",
            Namespace::Given => "Given",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who a balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder<'a> {
    Account(&'a Address),
    Channel(&'a str),
}

impl<'a> From<&'a Address> for Holder<'a> {
    fn from(address: &'a Address) -> Self {
        Holder::Account(address)
    }
}

impl fmt::Display for Holder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(address) => fmt::Display::fmt(address, f),
            Holder::Channel(channel) => f.write_str(channel),
        }
    }
}

/// Composite key of one balance.
pub fn balance_key(ns: Namespace, holder: Holder<'_>, token: &str) -> LedgerResult<String> {
    create_composite_key(KEY_BALANCE, &[ns.key_tag(), holder.to_string(), token.to_string()])
}

/// One decoded balance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub namespace: Namespace,
    pub holder: String,
    pub token: String,
    pub amount: BigInt,
}

impl BalanceEntry {
    fn decode(key: &str, value: &[u8]) -> LedgerResult<Self> {
        let (object_type, attrs) = split_composite_key(key)?;
        let [tag, holder, token]: [String; 3] = attrs
            .try_into()
            .map_err(|_| LedgerError::Invariant(format!("balance key {:?} has wrong arity", key)))?;
        if object_type != KEY_BALANCE {
            return Err(LedgerError::Invariant(format!("{:?} is not a balance key", key)));
        }
        let namespace = u8::from_str_radix(&tag, 16)
            .ok()
            .and_then(Namespace::from_tag)
            .ok_or_else(|| LedgerError::Invariant(format!("unknown balance tag {:?}", tag)))?;
        Ok(Self {
            namespace,
            holder,
            token,
            amount: BigInt::from_bytes(value),
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger operations
// ---------------------------------------------------------------------------

/// Balance operations bound to one stub and one reason.
///
/// The reason labels accounting records ("transfer", "fee", "emit", ...).
pub struct Balances<'a> {
    stub: &'a mut dyn ChaincodeStub,
    sink: Option<&'a dyn AccountingSink>,
    symbol: String,
    reason: &'a str,
}

impl<'a> Balances<'a> {
    pub fn new(
        stub: &'a mut dyn ChaincodeStub,
        symbol: impl Into<String>,
        reason: &'a str,
    ) -> Self {
        Self {
            stub,
            sink: None,
            symbol: symbol.into(),
            reason,
        }
    }

    pub fn with_sink(mut self, sink: Option<&'a dyn AccountingSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn get(&self, ns: Namespace, holder: Holder<'_>, token: &str) -> LedgerResult<BigInt> {
        let key = balance_key(ns, holder, token)?;
        Ok(self
            .stub
            .get_state(&key)?
            .map(|bytes| BigInt::from_bytes(&bytes))
            .unwrap_or_default())
    }

    fn write(
        &mut self,
        ns: Namespace,
        holder: Holder<'_>,
        token: &str,
        value: &BigInt,
    ) -> LedgerResult<()> {
        let key = balance_key(ns, holder, token)?;
        if value.is_zero() {
            self.stub.del_state(&key)
        } else {
            self.stub.put_state(&key, value.to_bytes())
        }
    }

    fn emit_record(
        &self,
        from: Option<(Namespace, Holder<'_>)>,
        to: Option<(Namespace, Holder<'_>)>,
        token: &str,
        amount: &BigInt,
    ) {
        let Some(sink) = self.sink else {
            return;
        };
        let symbol = if token.is_empty() { self.symbol.clone() } else { token.to_string() };
        sink.record(&AccountingRecord {
            symbol,
            from: from.map(|(_, h)| h.to_string()).unwrap_or_default(),
            to: to.map(|(_, h)| h.to_string()).unwrap_or_default(),
            amount: amount.clone(),
            from_ns: from.map(|(ns, _)| ns),
            to_ns: to.map(|(ns, _)| ns),
            reason: self.reason.to_string(),
        });
    }

    fn debited(
        &self,
        ns: Namespace,
        holder: Holder<'_>,
        token: &str,
        amount: &BigInt,
    ) -> LedgerResult<BigInt> {
        let current = self.get(ns, holder, token)?;
        current.checked_sub(amount).map_err(|_| LedgerError::InsufficientBalance {
            namespace: ns.to_string(),
            address: holder.to_string(),
            token: token.to_string(),
            available: current.to_string(),
            requested: amount.to_string(),
        })
    }

    /// Credits `amount`.
    pub fn add(
        &mut self,
        ns: Namespace,
        holder: Holder<'_>,
        token: &str,
        amount: &BigInt,
    ) -> LedgerResult<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let next = &self.get(ns, holder, token)? + amount;
        self.emit_record(None, Some((ns, holder)), token, amount);
        debug!(%ns, %holder, token, %amount, reason = self.reason, "balance credit");
        self.write(ns, holder, token, &next)
    }

    /// Debits `amount`, failing with `insufficient balance` if it would go
    /// negative.
    pub fn sub(
        &mut self,
        ns: Namespace,
        holder: Holder<'_>,
        token: &str,
        amount: &BigInt,
    ) -> LedgerResult<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let next = self.debited(ns, holder, token, amount)?;
        self.emit_record(Some((ns, holder)), None, token, amount);
        debug!(%ns, %holder, token, %amount, reason = self.reason, "balance debit");
        self.write(ns, holder, token, &next)
    }

    /// Debits `src` and credits `dst` as one step.
    pub fn transfer(
        &mut self,
        src_ns: Namespace,
        src: Holder<'_>,
        dst_ns: Namespace,
        dst: Holder<'_>,
        token: &str,
        amount: &BigInt,
    ) -> LedgerResult<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let debited = self.debited(src_ns, src, token, amount)?;
        self.emit_record(Some((src_ns, src)), Some((dst_ns, dst)), token, amount);
        debug!(
            from = %src,
            to = %dst,
            %src_ns,
            %dst_ns,
            token,
            %amount,
            reason = self.reason,
            "balance move"
        );
        self.write(src_ns, src, token, &debited)?;
        // Re-read: src and dst may be the same key.
        let credited = &self.get(dst_ns, dst, token)? + amount;
        self.write(dst_ns, dst, token, &credited)
    }

    /// All balances of one holder in one namespace, ordered by token.
    pub fn list_by_holder(
        &self,
        ns: Namespace,
        holder: Holder<'_>,
    ) -> LedgerResult<Vec<BalanceEntry>> {
        range_by_partial_key(&*self.stub, KEY_BALANCE, &[ns.key_tag(), holder.to_string()])?
            .into_iter()
            .map(|(k, v)| BalanceEntry::decode(&k, &v))
            .collect()
    }

    /// One page of a whole namespace.
    pub fn list_paginated(
        &self,
        ns: Namespace,
        page_size: u32,
        bookmark: &str,
    ) -> LedgerResult<Page<BalanceEntry>> {
        let page = range_by_partial_key_paginated(
            &*self.stub,
            KEY_BALANCE,
            &[ns.key_tag()],
            page_size,
            bookmark,
        )?;
        let items = page
            .items
            .into_iter()
            .map(|(k, v)| BalanceEntry::decode(&k, &v))
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(Page {
            items,
            bookmark: page.bookmark,
        })
    }

    /// Token → amount for one holder, ascending by token.
    pub fn aggregate(
        &self,
        ns: Namespace,
        holder: Holder<'_>,
    ) -> LedgerResult<BTreeMap<String, BigInt>> {
        let mut out: BTreeMap<String, BigInt> = BTreeMap::new();
        for entry in self.list_by_holder(ns, holder)? {
            let slot = out.entry(entry.token).or_default();
            *slot = &*slot + &entry.amount;
        }
        Ok(out)
    }

    /// Sum of `token` over every holder in `ns`.
    pub fn total(&self, ns: Namespace, token: &str) -> LedgerResult<BigInt> {
        Ok(range_by_partial_key(&*self.stub, KEY_BALANCE, &[ns.key_tag()])?
            .into_iter()
            .map(|(k, v)| BalanceEntry::decode(&k, &v))
            .collect::<LedgerResult<Vec<_>>>()?
            .into_iter()
            .filter(|e| e.token == token)
            .map(|e| e.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::MemoryWorld;
    use proptest::prelude::*;

    fn addr(seed: &[u8]) -> Address {
        Address::from_public_key(seed)
    }

    fn n(v: u64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn tags_are_wire_stable() {
        assert_eq!(Namespace::Token.key_tag(), "2b");
        assert_eq!(Namespace::Given.key_tag(), "2f");
        for ns in Namespace::ALL {
            assert_eq!(Namespace::from_tag(ns.tag()), Some(ns));
        }
        assert_eq!(Namespace::from_tag(0x30), None);
    }

    #[test]
    fn add_sub_and_zero_deletes() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let a = addr(b"a");
        let mut bal = Balances::new(&mut stub, "FIAT", "test");

        bal.add(Namespace::Token, (&a).into(), "", &n(10)).unwrap();
        assert_eq!(bal.get(Namespace::Token, (&a).into(), "").unwrap(), n(10));
        bal.sub(Namespace::Token, (&a).into(), "", &n(10)).unwrap();
        assert!(bal.get(Namespace::Token, (&a).into(), "").unwrap().is_zero());
        drop(bal);

        let key = balance_key(Namespace::Token, (&a).into(), "").unwrap();
        assert_eq!(stub.get_state(&key).unwrap(), None);
    }

    #[test]
    fn overdraft_fails_without_writing() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let (a, b) = (addr(b"a"), addr(b"b"));
        let mut bal = Balances::new(&mut stub, "FIAT", "test");
        bal.add(Namespace::Token, (&a).into(), "", &n(5)).unwrap();

        let err = bal
            .transfer(Namespace::Token, (&a).into(), Namespace::Token, (&b).into(), "", &n(6))
            .unwrap_err();
        assert!(err.to_string().starts_with("insufficient balance"));
        assert_eq!(bal.get(Namespace::Token, (&a).into(), "").unwrap(), n(5));
        assert!(bal.get(Namespace::Token, (&b).into(), "").unwrap().is_zero());
    }

    #[test]
    fn zero_amount_rejected() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let a = addr(b"a");
        let mut bal = Balances::new(&mut stub, "FIAT", "test");
        assert!(matches!(
            bal.add(Namespace::Token, (&a).into(), "", &BigInt::zero()),
            Err(LedgerError::ZeroAmount)
        ));
    }

    #[test]
    fn self_move_is_neutral() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let a = addr(b"a");
        let mut bal = Balances::new(&mut stub, "FIAT", "test");
        bal.add(Namespace::Token, (&a).into(), "", &n(3)).unwrap();
        bal.transfer(Namespace::Token, (&a).into(), Namespace::Token, (&a).into(), "", &n(2))
            .unwrap();
        assert_eq!(bal.get(Namespace::Token, (&a).into(), "").unwrap(), n(3));
    }

    #[test]
    fn lock_moves_between_namespaces() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let a = addr(b"a");
        let mut bal = Balances::new(&mut stub, "FIAT", "lock");
        bal.add(Namespace::Token, (&a).into(), "", &n(7)).unwrap();
        bal.transfer(Namespace::Token, (&a).into(), Namespace::TokenLocked, (&a).into(), "", &n(4))
            .unwrap();
        assert_eq!(bal.get(Namespace::Token, (&a).into(), "").unwrap(), n(3));
        assert_eq!(bal.get(Namespace::TokenLocked, (&a).into(), "").unwrap(), n(4));
    }

    #[test]
    fn aggregate_and_pagination() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let (a, b) = (addr(b"a"), addr(b"b"));
        let mut bal = Balances::new(&mut stub, "FIAT", "test");
        for (holder, token, v) in [(&a, "USD", 1), (&a, "EUR", 2), (&b, "USD", 3)] {
            bal.add(Namespace::Allowed, holder.into(), token, &n(v)).unwrap();
        }
        bal.add(Namespace::Given, Holder::Channel("cc"), "", &n(9)).unwrap();

        let agg = bal.aggregate(Namespace::Allowed, (&a).into()).unwrap();
        assert_eq!(agg.keys().cloned().collect::<Vec<_>>(), vec!["EUR", "USD"]);
        assert_eq!(bal.total(Namespace::Allowed, "USD").unwrap(), n(4));

        let first = bal.list_paginated(Namespace::Allowed, 2, "").unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(!first.bookmark.is_empty());
        let second = bal.list_paginated(Namespace::Allowed, 2, &first.bookmark).unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.bookmark.is_empty());
        assert!(second.items.iter().all(|e| e.namespace == Namespace::Allowed));
    }

    #[test]
    fn accounting_records_every_mutation() {
        let world = MemoryWorld::new("ch", "cc");
        let mut stub = world.stub(Vec::new(), Vec::new());
        let sink = MemorySink::new();
        let (a, b) = (addr(b"a"), addr(b"b"));
        let mut bal = Balances::new(&mut stub, "FIAT", "transfer").with_sink(Some(&sink));
        bal.add(Namespace::Token, (&a).into(), "", &n(5)).unwrap();
        bal.transfer(Namespace::Token, (&a).into(), Namespace::Token, (&b).into(), "", &n(2))
            .unwrap();
        let _ = bal.sub(Namespace::Token, (&b).into(), "", &n(100));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "FIAT");
        assert_eq!(records[0].from, "");
        assert_eq!(records[1].from, a.to_string());
        assert_eq!(records[1].to, b.to_string());
        assert_eq!(records[1].reason, "transfer");
    }

    proptest! {
        #[test]
        fn balances_never_go_negative(
            ops in proptest::collection::vec((any::<bool>(), 1u64..50), 1..40),
        ) {
            let world = MemoryWorld::new("ch", "cc");
            let mut stub = world.stub(Vec::new(), Vec::new());
            let a = addr(b"a");
            let mut bal = Balances::new(&mut stub, "FIAT", "prop");
            let mut model: u64 = 0;
            for (credit, v) in ops {
                if credit {
                    bal.add(Namespace::Token, (&a).into(), "", &n(v)).unwrap();
                    model += v;
                } else if bal.sub(Namespace::Token, (&a).into(), "", &n(v)).is_ok() {
                    prop_assert!(model >= v);
                    model -= v;
                } else {
                    prop_assert!(model < v);
                }
                prop_assert_eq!(bal.get(Namespace::Token, (&a).into(), "").unwrap(), n(model));
            }
        }
    }
}
