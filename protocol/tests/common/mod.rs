//! Shared harness: a small token contract wired to an in-memory host and
//! an in-memory ACL.

#![allow(dead_code)]

use std::sync::Arc;

use ledger_protocol::acl::MemoryAcl;
use ledger_protocol::batch::{batch_argument, BatchEvent};
use ledger_protocol::crypto::{KeyType, Keypair};
use ledger_protocol::envelope::{SignedEnvelope, UnsignedEnvelope};
use ledger_protocol::router::Json;
use ledger_protocol::stub::MemoryWorld;
use ledger_protocol::{
    token, Address, AuthPolicy, BigInt, Chaincode, Contract, CoreSettings, LedgerResult, Response,
    RouterBuilder, TokenConfig, TxContext,
};

pub const CHANNEL: &str = "fiat";
pub const RELAY: &[u8] = b"relay";
pub const NONCE_BASE: u64 = 1_700_000_000_000;

pub struct Demo;

fn emit(_: &Demo, ctx: &mut TxContext<'_>, to: Address, amount: BigInt) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(ledger_protocol::LedgerError::ZeroAmount);
    }
    ctx.balances("emit")?
        .add(ledger_protocol::balance::Namespace::Token, (&to).into(), "", &amount)?;
    let config = ctx.token_config_mut()?;
    config.total_emission = config.total_emission.clone() + amount;
    ctx.save_token_config()
}

fn note(_: &Demo, ctx: &mut TxContext<'_>, key: String, value: String) -> LedgerResult<String> {
    ctx.stub_mut().put_state(&key, value.clone().into_bytes())?;
    Ok(value)
}

fn notes(_: &Demo, ctx: &mut TxContext<'_>, key: String) -> LedgerResult<String> {
    let raw = ctx.stub().get_state(&key)?.unwrap_or_default();
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn fail(_: &Demo, _: &mut TxContext<'_>, reason: String) -> LedgerResult<()> {
    Err(ledger_protocol::LedgerError::domain(reason))
}

fn scribble(_: &Demo, ctx: &mut TxContext<'_>, items: Json<Vec<String>>) -> LedgerResult<usize> {
    for item in &items.0 {
        ctx.stub_mut().put_state(item, b"x".to_vec())?;
    }
    Ok(items.0.len())
}

impl Contract for Demo {
    fn routes(builder: RouterBuilder<Self>) -> RouterBuilder<Self> {
        token::routes(builder)
            .invoke_tx("emit", AuthPolicy::Admin, emit)
            .invoke_tx("fail", AuthPolicy::Signed, fail)
            .invoke_nbtx("note", note)
            .invoke_nbtx("scribble", scribble)
            .query("notes", notes)
    }
}

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed(KeyType::Ed25519, &[seed; 32]).unwrap()
}

pub struct Harness {
    pub world: MemoryWorld,
    pub chaincode: Chaincode<Demo>,
    pub acl: Arc<MemoryAcl>,
    pub admin: Keypair,
    pub admin_address: Address,
    nonce: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(CoreSettings::default())
    }

    pub fn with_settings(settings: CoreSettings) -> Self {
        let acl = Arc::new(MemoryAcl::new());
        let admin = keypair(100);
        let admin_address = acl.register("admin", vec![admin.public_key()]);
        let chaincode = Chaincode::new(Demo, settings).unwrap().with_acl(acl.clone());
        let mut world = MemoryWorld::new(CHANNEL, CHANNEL);

        let config = TokenConfig::new("FIAT", admin_address);
        let init = world.init(
            &chaincode,
            b"deployer",
            vec![b"init".to_vec(), serde_json::to_vec(&config).unwrap()],
        );
        assert!(init.is_ok(), "init failed: {}", init.message);
        Self {
            world,
            chaincode,
            acl,
            admin,
            admin_address,
            nonce: NONCE_BASE,
        }
    }

    pub fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }

    pub fn signed_args(
        &mut self,
        method: &str,
        args: &[&str],
        signers: &[&Keypair],
    ) -> Vec<Vec<u8>> {
        let nonce = self.next_nonce();
        self.signed_args_with_nonce(method, args, signers, nonce)
    }

    pub fn signed_args_with_nonce(
        &self,
        method: &str,
        args: &[&str],
        signers: &[&Keypair],
        nonce: u64,
    ) -> Vec<Vec<u8>> {
        SignedEnvelope::sign(
            method,
            "req",
            CHANNEL,
            CHANNEL,
            args.iter().map(|a| a.to_string()).collect(),
            nonce,
            signers,
        )
        .to_args()
    }

    pub fn unsigned_args(&self, method: &str, args: &[&str]) -> Vec<Vec<u8>> {
        UnsignedEnvelope {
            method: method.into(),
            request_id: "req".into(),
            channel: CHANNEL.into(),
            chaincode: CHANNEL.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
        .to_args()
    }

    pub fn invoke(&mut self, args: Vec<Vec<u8>>) -> Response {
        self.world.invoke(&self.chaincode, b"client", args)
    }

    /// Queues a signed call and returns its transaction id.
    pub fn submit(&mut self, method: &str, args: &[&str], signers: &[&Keypair]) -> String {
        let raw = self.signed_args(method, args, signers);
        let response = self.invoke(raw);
        assert!(response.is_ok(), "{} rejected: {}", method, response.message);
        response.payload_text()
    }

    pub fn batch(&mut self, tx_ids: Vec<String>) -> BatchEvent {
        let arg = batch_argument(tx_ids).unwrap();
        let response = self
            .world
            .invoke(&self.chaincode, RELAY, vec![b"batchExecute".to_vec(), arg]);
        assert!(response.is_ok(), "batch failed: {}", response.message);
        BatchEvent::from_bytes(&response.payload).unwrap()
    }

    pub fn query(&self, args: &[&str]) -> Response {
        let raw = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        self.world.query(&self.chaincode, b"client", raw)
    }

    pub fn balance(&self, address: &Address) -> BigInt {
        let response = self.query(&["balanceOf", &address.to_string()]);
        assert!(response.is_ok(), "{}", response.message);
        serde_json::from_slice(&response.payload).unwrap()
    }

    pub fn emit(&mut self, to: &Address, amount: u64) {
        let admin = self.admin.clone();
        let id = self.submit("emit", &[&to.to_string(), &amount.to_string()], &[&admin]);
        let event = self.batch(vec![id]);
        assert!(event.responses[0].is_ok(), "{:?}", event.responses[0]);
    }
}
