//! # Transaction Context
//!
//! Handlers never see the host directly. They receive a [`TxContext`]
//! holding the stub of the current invocation (or of the current batch
//! task), the authenticated sender, the effective transaction id and
//! timestamp, and the chaincode-wide [`Environment`].
//!
//! For a deferred task the id and timestamp are those of the enqueueing
//! transaction, not of the batch that executes it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::acl::{AclClient, RightRequest};
use crate::balance::{AccountingSink, Balances};
use crate::config::CoreSettings;
use crate::crypto::signatures::SchemeRegistry;
use crate::error::{LedgerError, LedgerResult};
use crate::stub::ChaincodeStub;
use crate::token::TokenConfig;
use crate::types::{AccountRef, Address};

/// Chaincode-wide collaborators, fixed at construction.
pub struct Environment {
    pub settings: CoreSettings,
    pub acl: Arc<dyn AclClient>,
    pub schemes: SchemeRegistry,
    pub accounting: Option<Arc<dyn AccountingSink>>,
}

impl Environment {
    pub fn new(settings: CoreSettings, acl: Arc<dyn AclClient>) -> Self {
        Self {
            settings,
            acl,
            schemes: SchemeRegistry::default(),
            accounting: None,
        }
    }
}

/// Everything a handler may touch during one call.
pub struct TxContext<'a> {
    stub: &'a mut dyn ChaincodeStub,
    env: &'a Environment,
    tx_id: String,
    timestamp: DateTime<Utc>,
    sender: Option<AccountRef>,
    config: Option<TokenConfig>,
}

impl<'a> TxContext<'a> {
    pub fn new(
        stub: &'a mut dyn ChaincodeStub,
        env: &'a Environment,
        tx_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        sender: Option<AccountRef>,
    ) -> Self {
        Self {
            stub,
            env,
            tx_id: tx_id.into(),
            timestamp,
            sender,
            config: None,
        }
    }

    /// A context for the current host invocation as-is.
    pub fn from_stub(
        stub: &'a mut dyn ChaincodeStub,
        env: &'a Environment,
        sender: Option<AccountRef>,
    ) -> Self {
        let tx_id = stub.tx_id().to_string();
        let timestamp = stub.tx_timestamp();
        Self::new(stub, env, tx_id, timestamp, sender)
    }

    pub fn stub(&self) -> &dyn ChaincodeStub {
        &*self.stub
    }

    pub fn stub_mut(&mut self) -> &mut dyn ChaincodeStub {
        &mut *self.stub
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    pub fn settings(&self) -> &'a CoreSettings {
        &self.env.settings
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn channel_id(&self) -> &str {
        self.stub.channel_id()
    }

    pub fn chaincode_name(&self) -> &str {
        self.stub.chaincode_name()
    }

    pub fn creator(&self) -> &[u8] {
        self.stub.creator()
    }

    /// The authenticated sender; `unauthorized` for unsigned calls.
    pub fn sender(&self) -> LedgerResult<&AccountRef> {
        self.sender.as_ref().ok_or(LedgerError::Unauthorized)
    }

    pub fn sender_address(&self) -> LedgerResult<Address> {
        self.sender().map(|s| *s.address())
    }

    pub fn has_sender(&self) -> bool {
        self.sender.is_some()
    }

    // -- Token config ----------------------------------------------------------

    fn ensure_config(&mut self) -> LedgerResult<()> {
        if self.config.is_none() {
            let loaded = TokenConfig::load(&*self.stub)?.ok_or(LedgerError::NotInitialized)?;
            self.config = Some(loaded);
        }
        Ok(())
    }

    /// The persisted token config, read once per context.
    pub fn token_config(&mut self) -> LedgerResult<&TokenConfig> {
        self.ensure_config()?;
        self.config.as_ref().ok_or(LedgerError::NotInitialized)
    }

    /// Mutable access; call [`save_token_config`](Self::save_token_config)
    /// to persist the change.
    pub fn token_config_mut(&mut self) -> LedgerResult<&mut TokenConfig> {
        self.ensure_config()?;
        self.config.as_mut().ok_or(LedgerError::NotInitialized)
    }

    pub fn save_token_config(&mut self) -> LedgerResult<()> {
        let config = self.config.as_ref().ok_or(LedgerError::NotInitialized)?;
        config.save(&mut *self.stub)
    }

    pub fn symbol(&mut self) -> LedgerResult<String> {
        Ok(self.token_config()?.symbol.clone())
    }

    /// Balance operations labelled with `reason`. Requires an initialised
    /// token so accounting records carry the native symbol.
    pub fn balances(&mut self, reason: &'static str) -> LedgerResult<Balances<'_>> {
        let symbol = self.symbol()?;
        let env = self.env;
        Ok(Balances::new(&mut *self.stub, symbol, reason).with_sink(env.accounting.as_deref()))
    }

    // -- Authorization -----------------------------------------------------------

    /// Requires the sender to be the token issuer.
    pub fn require_issuer(&mut self) -> LedgerResult<()> {
        let sender = self.sender_address()?;
        if sender != self.token_config()?.issuer {
            debug!(%sender, tx_id = %self.tx_id, "sender is not the issuer");
            return Err(LedgerError::Unauthorized);
        }
        Ok(())
    }

    /// Requires the creator to be on the relay allow-list.
    pub fn require_relay(&self) -> LedgerResult<()> {
        if self.env.settings.is_relay(self.stub.creator()) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    /// Asks the ACL whether the sender holds `role` for `operation` on this
    /// chaincode.
    pub fn has_right(&mut self, role: &str, operation: &str) -> LedgerResult<bool> {
        let request = RightRequest {
            channel: self.stub.channel_id().to_string(),
            chaincode: self.stub.chaincode_name().to_string(),
            role: role.to_string(),
            operation: operation.to_string(),
            address: self.sender_address()?,
        };
        self.env.acl.has_right(&mut *self.stub, &request)
    }

    /// Resolves `address` against the ACL. Addresses the ACL does not know
    /// stay unresolved.
    pub fn resolve(&mut self, address: Address) -> LedgerResult<AccountRef> {
        match self.env.acl.account_info(&mut *self.stub, &address) {
            Ok(status) if !status.user_id.is_empty() => {
                Ok(AccountRef::resolved(address, status.user_id))
            }
            Ok(_) | Err(LedgerError::UnknownKey(_)) => Ok(AccountRef::unresolved(address)),
            Err(e) => Err(e),
        }
    }

    pub fn set_event(&mut self, name: &str, payload: Vec<u8>) -> LedgerResult<()> {
        self.stub.set_event(name, payload)
    }
}
