//! # Invocation Pipeline
//!
//! [`Chaincode`] is what the host talks to. It owns a [`Contract`], the
//! router built from it, and the chaincode-wide [`Environment`], and turns
//! each host call into one of:
//!
//! | Function                 | Path                                              |
//! |--------------------------|---------------------------------------------------|
//! | `init`                   | [`Contract::init`]                                |
//! | `query`                  | named query handler on a read-only stub           |
//! | `batchExecute`           | queued preimages by id ([`crate::batch`])         |
//! | `executeTasks`           | inline signed tasks ([`crate::batch`])            |
//! | `invoke-tx` method       | authenticate, record nonce, queue the preimage    |
//! | `invoke-nbtx` method     | check target, queue the preimage                  |
//! | `invoke` method          | run now, authenticated if the route says so       |
//! | `query` method           | run on a read-only stub                           |
//!
//! Deferred methods return the host transaction id; their handler runs
//! later, inside a batch.

mod auth;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::acl::{AclClient, ChaincodeAcl};
use crate::balance::AccountingSink;
use crate::batch::preimage::{self, batch_transaction, sender_record};
use crate::config::{CoreSettings, FN_BATCH_EXECUTE, FN_EXECUTE_TASKS, FN_INIT, FN_QUERY};
use crate::context::{Environment, TxContext};
use crate::crypto::SignatureScheme;
use crate::envelope::UnsignedEnvelope;
use crate::error::{ErrorKind, LedgerError, LedgerResult};
use crate::nonce::NonceGuard;
use crate::router::{MethodKind, Route, Router, RouterBuilder};
use crate::stub::{arg_text, ChaincodeInterface, ChaincodeStub, ReadOnlyStub, Response};
use crate::token::TokenConfig;
use crate::types::proto::PendingTx;

/// A contract: its routes plus its initialisation.
pub trait Contract: Send + Sync + Sized + 'static {
    /// Registers the contract's operations.
    fn routes(builder: RouterBuilder<Self>) -> RouterBuilder<Self>;

    /// Runs once, from the host `init` entry. The default expects a single
    /// JSON [`TokenConfig`] and persists it.
    fn init(&self, ctx: &mut TxContext<'_>, args: &[Vec<u8>]) -> LedgerResult<()> {
        init_token(ctx, args).map(|_| ())
    }
}

/// Parses `args` as one JSON token config and persists it.
pub fn init_token(ctx: &mut TxContext<'_>, args: &[Vec<u8>]) -> LedgerResult<TokenConfig> {
    if args.len() != 1 {
        return Err(LedgerError::WrongArgumentCount {
            method: FN_INIT.to_string(),
            expected: 1,
            got: args.len(),
        });
    }
    let config: TokenConfig = serde_json::from_slice(&args[0])?;
    config.initialize(ctx.stub_mut())?;
    info!(symbol = %config.symbol, issuer = %config.issuer, "token initialized");
    Ok(config)
}

/// The host-facing chaincode.
pub struct Chaincode<C: Contract> {
    pub(crate) contract: C,
    pub(crate) router: Router<C>,
    pub(crate) env: Environment,
    pub(crate) nonces: NonceGuard,
}

impl<C: Contract> Chaincode<C> {
    /// Builds the router and wires the ACL chaincode named in `settings`.
    pub fn new(contract: C, settings: CoreSettings) -> LedgerResult<Self> {
        let builder =
            C::routes(RouterBuilder::new()).query("batchTransaction", batch_transaction::<C>);
        let router = builder.build()?;
        let acl: Arc<dyn AclClient> = Arc::new(ChaincodeAcl::new(settings.acl_chaincode.clone()));
        let nonces = NonceGuard::new(settings.nonce_window);
        debug!(routes = router.len(), "chaincode constructed");
        Ok(Self {
            contract,
            router,
            env: Environment::new(settings, acl),
            nonces,
        })
    }

    /// Replaces the ACL client.
    pub fn with_acl(mut self, acl: Arc<dyn AclClient>) -> Self {
        self.env.acl = acl;
        self
    }

    pub fn with_accounting(mut self, sink: Arc<dyn AccountingSink>) -> Self {
        self.env.accounting = Some(sink);
        self
    }

    /// Adds a signature verifier, e.g. for a GOST key type.
    pub fn with_scheme(mut self, scheme: Arc<dyn SignatureScheme>) -> Self {
        self.env.schemes.register(scheme);
        self
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    pub fn router(&self) -> &Router<C> {
        &self.router
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.env.settings
    }

    // -- Entry points ------------------------------------------------------------

    fn run_init(&self, stub: &mut dyn ChaincodeStub) -> LedgerResult<Vec<u8>> {
        let args = stub.args().to_vec();
        let rest = match args.first() {
            Some(first) if first.as_slice() == FN_INIT.as_bytes() => &args[1..],
            _ => &args[..],
        };
        let mut ctx = TxContext::from_stub(stub, &self.env, None);
        self.contract.init(&mut ctx, rest)?;
        Ok(Vec::new())
    }

    fn dispatch(&self, stub: &mut dyn ChaincodeStub) -> LedgerResult<Vec<u8>> {
        let args = stub.args().to_vec();
        let function = arg_text(&args, 0)?.to_string();
        let rest = &args[1..];
        match function.as_str() {
            FN_INIT => self.run_init(stub),
            FN_QUERY => self.reflect_query(stub, rest),
            FN_BATCH_EXECUTE => self.batch_execute(stub, rest),
            FN_EXECUTE_TASKS => self.execute_tasks(stub, rest),
            name => {
                let route = self.router.lookup(name)?;
                match route.kind() {
                    MethodKind::InvokeTx => self.enqueue_signed(stub, route, name, rest),
                    MethodKind::InvokeNbtx => self.enqueue_unsigned(stub, route, name, rest),
                    MethodKind::Invoke => self.invoke_now(stub, route, name, rest),
                    MethodKind::Query => self.run_query(stub, route, rest),
                }
            }
        }
    }

    fn dispatch_query(&self, stub: &mut dyn ChaincodeStub) -> LedgerResult<Vec<u8>> {
        let args = stub.args().to_vec();
        let function = arg_text(&args, 0)?.to_string();
        let rest = &args[1..];
        if function == FN_QUERY {
            return self.reflect_query(stub, rest);
        }
        let route = self.router.lookup(&function)?;
        if route.kind() != MethodKind::Query {
            return Err(LedgerError::Malformed(format!("{} is not a query", function)));
        }
        self.run_query(stub, route, rest)
    }

    // -- Paths -------------------------------------------------------------------

    /// `query` function: `args[1]` names a query method.
    fn reflect_query(
        &self,
        stub: &mut dyn ChaincodeStub,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        let method = arg_text(rest, 0)?;
        let route = self.router.lookup(method)?;
        if route.kind() != MethodKind::Query {
            return Err(LedgerError::Malformed(format!("{} is not a query", method)));
        }
        self.run_query(stub, route, &rest[1..])
    }

    fn run_query(
        &self,
        stub: &mut dyn ChaincodeStub,
        route: &Route<C>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        route.check(args)?;
        let mut read_only = ReadOnlyStub::new(stub);
        let mut ctx = TxContext::from_stub(&mut read_only, &self.env, None);
        route.call(&self.contract, &mut ctx, args)
    }

    fn enqueue_signed(
        &self,
        stub: &mut dyn ChaincodeStub,
        route: &Route<C>,
        function: &str,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        let signed = self.authorize_signed(stub, route, function, rest)?;
        let tx_id = stub.tx_id().to_string();
        let pending = PendingTx {
            method: route.name().to_string(),
            sender: Some(sender_record(&signed.sender)),
            args: signed.envelope.args,
            timestamp_ms: stub.tx_timestamp().timestamp_millis(),
            nonce: signed.nonce,
            request_id: signed.envelope.request_id,
        };
        preimage::store(stub, &tx_id, &pending)?;
        debug!(%tx_id, method = route.name(), sender = %signed.sender, "signed transaction queued");
        Ok(tx_id.into_bytes())
    }

    fn enqueue_unsigned(
        &self,
        stub: &mut dyn ChaincodeStub,
        route: &Route<C>,
        function: &str,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        let envelope = UnsignedEnvelope::parse(function, rest, route.arity())?;
        envelope.check_target(stub.channel_id(), stub.chaincode_name())?;
        let args: Vec<Vec<u8>> = envelope.args.iter().map(|a| a.clone().into_bytes()).collect();
        route.check(&args)?;
        let tx_id = stub.tx_id().to_string();
        let pending = PendingTx {
            method: route.name().to_string(),
            sender: None,
            args: envelope.args,
            timestamp_ms: stub.tx_timestamp().timestamp_millis(),
            nonce: 0,
            request_id: envelope.request_id,
        };
        preimage::store(stub, &tx_id, &pending)?;
        debug!(%tx_id, method = route.name(), "unsigned transaction queued");
        Ok(tx_id.into_bytes())
    }

    fn invoke_now(
        &self,
        stub: &mut dyn ChaincodeStub,
        route: &Route<C>,
        function: &str,
        rest: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        if !route.auth().requires_signature() {
            route.check(rest)?;
            let mut ctx = TxContext::from_stub(stub, &self.env, None);
            return route.call(&self.contract, &mut ctx, rest);
        }
        let signed = self.authorize_signed(stub, route, function, rest)?;
        let args: Vec<Vec<u8>> = signed
            .envelope
            .args
            .iter()
            .map(|a| a.clone().into_bytes())
            .collect();
        let mut ctx = TxContext::from_stub(stub, &self.env, Some(signed.sender));
        route.call(&self.contract, &mut ctx, &args)
    }
}

fn log_failure(function: &str, tx_id: &str, e: &LedgerError) {
    match e.kind() {
        ErrorKind::Authentication | ErrorKind::Replay => {
            warn!(function, tx_id, error = %e, "invocation rejected")
        }
        ErrorKind::Infrastructure | ErrorKind::Fatal => {
            error!(function, tx_id, error = %e, "invocation aborted")
        }
        ErrorKind::Decoding | ErrorKind::Domain => {
            debug!(function, tx_id, error = %e, "invocation failed")
        }
    }
}

fn function_name(stub: &dyn ChaincodeStub) -> String {
    stub.args()
        .first()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .unwrap_or_default()
}

impl<C: Contract> ChaincodeInterface for Chaincode<C> {
    fn init(&self, stub: &mut dyn ChaincodeStub) -> Response {
        let result = self.run_init(stub);
        if let Err(e) = &result {
            log_failure(FN_INIT, stub.tx_id(), e);
        }
        result.into()
    }

    fn invoke(&self, stub: &mut dyn ChaincodeStub) -> Response {
        let result = self.dispatch(stub);
        if let Err(e) = &result {
            log_failure(&function_name(stub), stub.tx_id(), e);
        }
        result.into()
    }

    fn query(&self, stub: &mut dyn ChaincodeStub) -> Response {
        let result = self.dispatch_query(stub);
        if let Err(e) = &result {
            log_failure(&function_name(stub), stub.tx_id(), e);
        }
        result.into()
    }
}
