//! Fiat token scenarios on a single channel.
//!
//! Every state change goes the way a client would drive it: a signed call
//! is queued, then a relay executes it in a batch.

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use common::{keypair, token_init, Host};
use ledger_contracts::FiatToken;
use ledger_protocol::acl::MemoryAcl;
use ledger_protocol::crypto::Keypair;
use ledger_protocol::{Address, BigInt};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fiat {
    host: Host<FiatToken>,
    acl: Arc<MemoryAcl>,
    admin: Keypair,
}

impl Fiat {
    fn new() -> Self {
        let acl = Arc::new(MemoryAcl::new());
        let admin = keypair(1);
        let issuer = acl.register("issuer", vec![admin.public_key()]);
        let host = Host::new(FiatToken, "fiat", acl.clone(), token_init("FIAT", issuer));
        Self { host, acl, admin }
    }

    fn user(&self, name: &str, seed: u8) -> (Keypair, Address) {
        let key = keypair(seed);
        let address = self.acl.register(name, vec![key.public_key()]);
        (key, address)
    }

    fn emit(&mut self, to: &Address, amount: u64) {
        let admin = self.admin.clone();
        self.host
            .call_ok("emit", &[&to.to_string(), &amount.to_string()], &[&admin]);
    }
}

fn n(v: u64) -> BigInt {
    BigInt::from(v)
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

#[test]
fn emit_credits_and_counts_emission() {
    let mut fx = Fiat::new();
    let (_, alice) = fx.user("alice", 10);

    fx.emit(&alice, 1000);
    assert_eq!(fx.host.balance(&alice), n(1000));
    fx.emit(&alice, 500);
    assert_eq!(fx.host.balance(&alice), n(1500));
    assert_eq!(fx.host.total_emission(), n(1500));
}

#[test]
fn only_the_issuer_emits() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    let queued = fx
        .host
        .enqueue("emit", &[&alice.to_string(), "10"], &[&alice_key]);
    assert!(!queued.is_ok());
    assert_eq!(queued.message, "unauthorized");
}

#[test]
fn multi_emit_credits_every_recipient() {
    let mut fx = Fiat::new();
    let (_, alice) = fx.user("alice", 10);
    let (_, bob) = fx.user("bob", 11);
    let list = serde_json::json!([
        {"to": alice.to_string(), "amount": "70"},
        {"to": bob.to_string(), "amount": "30"},
    ])
    .to_string();

    let admin = fx.admin.clone();
    fx.host.call_ok("multiEmit", &[&list], &[&admin]);
    assert_eq!(fx.host.balance(&alice), n(70));
    assert_eq!(fx.host.balance(&bob), n(30));
    assert_eq!(fx.host.total_emission(), n(100));
}

#[test]
fn redeem_burns_the_senders_tokens() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    fx.emit(&alice, 100);

    fx.host.call_ok("redeem", &["40", "payout-17"], &[&alice_key]);
    assert_eq!(fx.host.balance(&alice), n(60));
    assert_eq!(fx.host.total_emission(), n(60));

    let over = fx.host.call("redeem", &["61", "payout-18"], &[&alice_key]);
    assert!(over.error.unwrap().starts_with("insufficient balance"));
    assert_eq!(fx.host.total_emission(), n(60));
}

// ---------------------------------------------------------------------------
// Transfers and fees
// ---------------------------------------------------------------------------

fn with_one_percent_fee(fx: &mut Fiat, collector: &Address) {
    let admin = fx.admin.clone();
    fx.host.call_ok("setFee", &["FIAT", "1000000", "1", "0"], &[&admin]);
    fx.host
        .call_ok("setFeeAddress", &[&collector.to_string()], &[&admin]);
}

#[test]
fn transfer_charges_the_fee_to_the_sender() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    let (_, bob) = fx.user("bob", 11);
    let (_, collector) = fx.user("collector", 12);
    fx.emit(&alice, 1000);
    with_one_percent_fee(&mut fx, &collector);

    let fee: serde_json::Value = fx.host.query_json(&["predictFee", "200"]);
    assert_eq!(fee["fee"], "2");

    fx.host
        .call_ok("transfer", &[&bob.to_string(), "200", "rent"], &[&alice_key]);
    assert_eq!(fx.host.balance(&alice), n(798));
    assert_eq!(fx.host.balance(&bob), n(200));
    assert_eq!(fx.host.balance(&collector), n(2));
    assert_eq!(fx.host.total_emission(), n(1000));
}

#[test]
fn transfer_between_own_accounts_is_free() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    let (_, alice_savings) = fx.user("alice", 13);
    let (_, collector) = fx.user("collector", 12);
    fx.emit(&alice, 1000);
    with_one_percent_fee(&mut fx, &collector);

    fx.host
        .call_ok("transfer", &[&alice_savings.to_string(), "500", ""], &[&alice_key]);
    assert_eq!(fx.host.balance(&alice), n(500));
    assert_eq!(fx.host.balance(&alice_savings), n(500));
    assert_eq!(fx.host.balance(&collector), BigInt::zero());
}

#[test]
fn transfer_without_funds_fails_in_the_batch() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    let (_, bob) = fx.user("bob", 11);
    fx.emit(&alice, 5);

    let response = fx
        .host
        .call("transfer", &[&bob.to_string(), "6", ""], &[&alice_key]);
    assert!(!response.is_ok());
    assert_eq!(fx.host.balance(&alice), n(5));
    assert_eq!(fx.host.balance(&bob), BigInt::zero());
}

#[test]
fn replayed_nonce_is_rejected_at_enqueue() {
    let mut fx = Fiat::new();
    let (alice_key, alice) = fx.user("alice", 10);
    let (_, bob) = fx.user("bob", 11);
    fx.emit(&alice, 10);

    let args = fx.host.signed_args_with_nonce(
        "transfer",
        &[&bob.to_string(), "1", ""],
        &[&alice_key],
        common::NONCE_BASE + 500,
    );
    let first = fx.host.world.invoke(&fx.host.chaincode, b"client", args.clone());
    assert!(first.is_ok(), "{}", first.message);
    let second = fx.host.world.invoke(&fx.host.chaincode, b"client", args);
    assert!(second.message.starts_with("nonce already used"));

    fx.host.batch(vec![first.payload_text()]);
    assert_eq!(fx.host.balance(&bob), n(1));
}

// ---------------------------------------------------------------------------
// Multi-signature issuer
// ---------------------------------------------------------------------------

#[test]
fn multisig_issuer_needs_every_key_and_follows_rotation() {
    let acl = Arc::new(MemoryAcl::new());
    let (k1, k2, k3) = (keypair(1), keypair(2), keypair(3));
    let issuer = acl.register("board", vec![k1.public_key(), k2.public_key(), k3.public_key()]);
    let mut host = Host::new(FiatToken, "fiat", acl.clone(), token_init("FIAT", issuer));
    let alice = acl.register("alice", vec![keypair(10).public_key()]);

    host.call_ok("emit", &[&alice.to_string(), "100"], &[&k1, &k2, &k3]);
    assert_eq!(host.balance(&alice), n(100));

    let partial = host.enqueue("emit", &[&alice.to_string(), "100"], &[&k1, &k2]);
    assert!(!partial.is_ok());

    let k4 = keypair(4);
    acl.rotate_key(&issuer, &k3.public_key(), k4.public_key()).unwrap();
    let stale = host.enqueue("emit", &[&alice.to_string(), "100"], &[&k1, &k2, &k3]);
    assert!(!stale.is_ok());
    host.call_ok("emit", &[&alice.to_string(), "50"], &[&k1, &k2, &k4]);
    assert_eq!(host.balance(&alice), n(150));
    assert_eq!(host.total_emission(), n(150));
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Emit { to: usize, amount: u64 },
    Transfer { from: usize, to: usize, amount: u64 },
    Redeem { from: usize, amount: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1..500u64).prop_map(|(to, amount)| Op::Emit { to, amount }),
        (0..3usize, 0..3usize, 1..300u64)
            .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (0..3usize, 1..200u64).prop_map(|(from, amount)| Op::Redeem { from, amount }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn balances_always_sum_to_total_emission(ops in proptest::collection::vec(op(), 1..12)) {
        let mut fx = Fiat::new();
        let users: Vec<(Keypair, Address)> = (0..3)
            .map(|i| fx.user(&format!("user{}", i), 20 + i as u8))
            .collect();
        let admin = fx.admin.clone();

        for op in ops {
            match op {
                Op::Emit { to, amount } => {
                    let to = users[to].1.to_string();
                    fx.host.call("emit", &[&to, &amount.to_string()], &[&admin]);
                }
                Op::Transfer { from, to, amount } => {
                    let key = users[from].0.clone();
                    let to = users[to].1.to_string();
                    fx.host.call("transfer", &[&to, &amount.to_string(), ""], &[&key]);
                }
                Op::Redeem { from, amount } => {
                    let key = users[from].0.clone();
                    fx.host.call("redeem", &[&amount.to_string(), ""], &[&key]);
                }
            }
            let held: BigInt = users.iter().map(|(_, a)| fx.host.balance(a)).sum();
            prop_assert_eq!(held, fx.host.total_emission());
        }
    }
}
