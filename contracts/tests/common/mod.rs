//! Shared harness: one contract instance per channel, all of them on
//! in-memory hosts sharing one in-memory ACL.

#![allow(dead_code)]

use std::sync::Arc;

use serde::de::DeserializeOwned;

use ledger_protocol::acl::MemoryAcl;
use ledger_protocol::batch::{batch_argument, BatchEvent, TaskResponse};
use ledger_protocol::crypto::{KeyType, Keypair};
use ledger_protocol::envelope::SignedEnvelope;
use ledger_protocol::stub::MemoryWorld;
use ledger_protocol::{Address, BigInt, Chaincode, Contract, CoreSettings, Response, TokenConfig};

pub const RELAY: &[u8] = b"relay";
pub const NONCE_BASE: u64 = 1_700_000_000_000;

pub fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed(KeyType::Ed25519, &[seed; 32]).unwrap()
}

/// `init` argument of a token with `symbol` issued by `issuer`.
pub fn token_init(symbol: &str, issuer: Address) -> Vec<u8> {
    serde_json::to_vec(&TokenConfig::new(symbol, issuer)).unwrap()
}

pub struct Host<C: Contract> {
    pub world: MemoryWorld,
    pub chaincode: Chaincode<C>,
    pub channel: String,
    nonce: u64,
}

impl<C: Contract> Host<C> {
    pub fn new(contract: C, channel: &str, acl: Arc<MemoryAcl>, init: Vec<u8>) -> Self {
        Self::with_settings(contract, channel, acl, CoreSettings::default(), init)
    }

    pub fn with_settings(
        contract: C,
        channel: &str,
        acl: Arc<MemoryAcl>,
        settings: CoreSettings,
        init: Vec<u8>,
    ) -> Self {
        let chaincode = Chaincode::new(contract, settings).unwrap().with_acl(acl);
        let mut world = MemoryWorld::new(channel, channel);
        let response = world.init(&chaincode, b"deployer", vec![b"init".to_vec(), init]);
        assert!(response.is_ok(), "init on {} failed: {}", channel, response.message);
        Self {
            world,
            chaincode,
            channel: channel.to_string(),
            nonce: NONCE_BASE,
        }
    }

    pub fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
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
            &self.channel,
            &self.channel,
            args.iter().map(|a| a.to_string()).collect(),
            nonce,
            signers,
        )
        .to_args()
    }

    /// Queues a signed call; the raw host response.
    pub fn enqueue(&mut self, method: &str, args: &[&str], signers: &[&Keypair]) -> Response {
        let nonce = self.next_nonce();
        let raw = self.signed_args_with_nonce(method, args, signers, nonce);
        self.world.invoke(&self.chaincode, b"client", raw)
    }

    pub fn batch(&mut self, tx_ids: Vec<String>) -> BatchEvent {
        let arg = batch_argument(tx_ids).unwrap();
        let response = self
            .world
            .invoke(&self.chaincode, RELAY, vec![b"batchExecute".to_vec(), arg]);
        assert!(response.is_ok(), "batch failed: {}", response.message);
        BatchEvent::from_bytes(&response.payload).unwrap()
    }

    /// Queues a signed call and executes it in a batch of its own.
    pub fn call(&mut self, method: &str, args: &[&str], signers: &[&Keypair]) -> TaskResponse {
        let queued = self.enqueue(method, args, signers);
        assert!(queued.is_ok(), "{} rejected: {}", method, queued.message);
        let mut event = self.batch(vec![queued.payload_text()]);
        event.responses.remove(0)
    }

    /// Like [`call`](Self::call) but the task must succeed.
    pub fn call_ok(
        &mut self,
        method: &str,
        args: &[&str],
        signers: &[&Keypair],
    ) -> Option<serde_json::Value> {
        let response = self.call(method, args, signers);
        assert!(response.is_ok(), "{} failed: {:?}", method, response.error);
        response.payload
    }

    /// An unsigned immediate invoke from the relay identity.
    pub fn relay(&mut self, method: &str, args: &[&str]) -> Response {
        let mut raw = vec![method.as_bytes().to_vec()];
        raw.extend(args.iter().map(|a| a.as_bytes().to_vec()));
        self.world.invoke(&self.chaincode, RELAY, raw)
    }

    pub fn relay_ok(&mut self, method: &str, args: &[&str]) {
        let response = self.relay(method, args);
        assert!(response.is_ok(), "{} on {} failed: {}", method, self.channel, response.message);
    }

    pub fn query(&self, args: &[&str]) -> Response {
        let raw = args.iter().map(|a| a.as_bytes().to_vec()).collect();
        self.world.query(&self.chaincode, b"client", raw)
    }

    pub fn query_json<T: DeserializeOwned>(&self, args: &[&str]) -> T {
        let response = self.query(args);
        assert!(response.is_ok(), "{:?} failed: {}", args, response.message);
        serde_json::from_slice(&response.payload).unwrap()
    }

    pub fn balance(&self, address: &Address) -> BigInt {
        self.query_json(&["balanceOf", &address.to_string()])
    }

    pub fn allowed(&self, address: &Address, token: &str) -> BigInt {
        self.query_json(&["allowedBalanceOf", &address.to_string(), token])
    }

    pub fn locked(&self, address: &Address) -> BigInt {
        self.query_json(&["lockedBalanceOf", &address.to_string()])
    }

    pub fn given(&self, channel: &str) -> BigInt {
        self.query_json(&["givenBalance", channel])
    }

    pub fn total_emission(&self) -> BigInt {
        self.query_json::<TokenConfig>(&["metadata"]).total_emission
    }
}
