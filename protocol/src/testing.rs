//! Shared helpers for unit tests.

use std::sync::Arc;

use crate::acl::MemoryAcl;
use crate::balance::AccountingSink;
use crate::config::CoreSettings;
use crate::context::{Environment, TxContext};
use crate::stub::{ChaincodeStub, MemoryWorld};
use crate::token::TokenConfig;
use crate::types::{AccountRef, Address};

pub(crate) struct Fixture {
    pub world: MemoryWorld,
    pub env: Environment,
    pub acl: Arc<MemoryAcl>,
    pub issuer: Address,
}

impl Fixture {
    /// A world with an initialised `FIAT` token.
    pub fn new() -> Self {
        let mut fx = Self::bare();
        let config = TokenConfig::new("FIAT", fx.issuer);
        let mut stub = fx.world.stub(Vec::new(), Vec::new());
        config.initialize(&mut stub).unwrap();
        let write_set = stub.into_write_set();
        fx.world.commit("init", write_set);
        fx
    }

    /// A world without token config.
    pub fn bare() -> Self {
        let acl = Arc::new(MemoryAcl::new());
        Self {
            world: MemoryWorld::new("ch", "cc"),
            env: Environment::new(CoreSettings::default(), acl.clone()),
            acl,
            issuer: Address::from_public_key(b"issuer"),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AccountingSink>) -> Self {
        self.env.accounting = Some(sink);
        self
    }

    /// Runs `f` in a context over the committed state and commits whatever
    /// it wrote.
    pub fn run<R>(
        &mut self,
        sender: Option<AccountRef>,
        f: impl FnOnce(&mut TxContext<'_>) -> R,
    ) -> R {
        let mut stub = self.world.stub(b"creator".to_vec(), Vec::new());
        let tx_id = stub.tx_id().to_string();
        let out = {
            let mut ctx = TxContext::from_stub(&mut stub, &self.env, sender);
            f(&mut ctx)
        };
        let write_set = stub.into_write_set();
        self.world.commit(&tx_id, write_set);
        out
    }
}
