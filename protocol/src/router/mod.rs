//! # Router
//!
//! Maps external function names to typed handlers. A router is assembled
//! once when the chaincode is constructed and is read-only afterwards.
//!
//! Every route carries an explicit classification ([`MethodKind`]) and an
//! [`AuthPolicy`]. Contracts declare them directly through
//! [`RouterBuilder`], or derive them from handler names ([`reflect`]) or
//! from a protobuf service description ([`descriptor`]). All three paths
//! produce the same table, so the pipeline cannot tell them apart.

pub mod args;
pub mod descriptor;
pub mod handler;
pub mod reflect;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::RESERVED_FUNCTIONS;
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};

pub use args::{Json, Param, Proto};
pub use descriptor::{MethodDescriptor, MethodType, ServiceDescriptor, ServiceRouter};
pub use handler::Handler;

use handler::{Erased, ErasedHandler};

/// How an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    /// Read-only; runs on a stub that refuses writes.
    Query,
    /// Write, executed immediately in the current transaction.
    Invoke,
    /// Write, signed and nonce-checked, queued for batch execution.
    InvokeTx,
    /// Write, queued for batch execution without signature or nonce.
    InvokeNbtx,
}

impl MethodKind {
    /// Returns `true` for kinds whose handler runs inside a batch.
    pub fn is_deferred(self) -> bool {
        matches!(self, MethodKind::InvokeTx | MethodKind::InvokeNbtx)
    }

    pub fn writes(self) -> bool {
        !matches!(self, MethodKind::Query)
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodKind::Query => "query",
            MethodKind::Invoke => "invoke",
            MethodKind::InvokeTx => "invoke-tx",
            MethodKind::InvokeNbtx => "invoke-nbtx",
        };
        f.write_str(s)
    }
}

/// Who may call an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthPolicy {
    /// No signature.
    None,
    /// Any account known to the ACL, single or multi-signature.
    Signed,
    /// A multi-signature account; every component key must sign.
    MultiSig,
    /// The token issuer.
    Admin,
}

impl AuthPolicy {
    pub fn requires_signature(self) -> bool {
        !matches!(self, AuthPolicy::None)
    }
}

/// One routed operation.
pub struct Route<C> {
    name: String,
    kind: MethodKind,
    auth: AuthPolicy,
    handler: Box<dyn ErasedHandler<C>>,
}

impl<C> Route<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn auth(&self) -> AuthPolicy {
        self.auth
    }

    pub fn arity(&self) -> usize {
        self.handler.arity()
    }

    fn expect_arity(&self, args: &[Vec<u8>]) -> LedgerResult<()> {
        if args.len() != self.arity() {
            return Err(LedgerError::WrongArgumentCount {
                method: self.name.clone(),
                expected: self.arity(),
                got: args.len(),
            });
        }
        Ok(())
    }

    /// Validates argument count and decoding without touching state.
    pub fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()> {
        self.expect_arity(args)?;
        self.handler.check(args)
    }

    /// Runs the handler and returns its serialised output.
    pub fn call(
        &self,
        contract: &C,
        ctx: &mut TxContext<'_>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        self.expect_arity(args)?;
        self.handler.call(contract, ctx, args)
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            name: self.name.clone(),
            kind: self.kind,
            auth: self.auth,
            arity: self.arity(),
        }
    }
}

impl<C> fmt::Debug for Route<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("auth", &self.auth)
            .field("arity", &self.arity())
            .finish()
    }
}

/// Serializable summary of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub name: String,
    pub kind: MethodKind,
    pub auth: AuthPolicy,
    pub arity: usize,
}

/// Collects routes, then validates the whole table in [`build`](Self::build).
pub struct RouterBuilder<C> {
    routes: BTreeMap<String, Route<C>>,
    aliases: BTreeMap<String, String>,
    problems: Vec<String>,
}

impl<C: 'static> Default for RouterBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> RouterBuilder<C> {
    pub fn new() -> Self {
        Self {
            routes: BTreeMap::new(),
            aliases: BTreeMap::new(),
            problems: Vec::new(),
        }
    }

    /// Registers `handler` under `name`.
    pub fn route<H, M>(mut self, name: &str, kind: MethodKind, auth: AuthPolicy, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        if name.is_empty() {
            self.problems.push("empty method name".to_string());
            return self;
        }
        if RESERVED_FUNCTIONS.contains(&name) {
            self.problems.push(format!("{} is a reserved function name", name));
            return self;
        }
        if self.routes.contains_key(name) || self.aliases.contains_key(name) {
            self.problems.push(format!("{} registered twice", name));
            return self;
        }
        match (kind, auth) {
            (MethodKind::InvokeTx, AuthPolicy::None) => {
                self.problems.push(format!("{}: invoke-tx needs a signing policy", name));
                return self;
            }
            (MethodKind::Query | MethodKind::InvokeNbtx, policy) if policy != AuthPolicy::None => {
                self.problems.push(format!("{}: {} cannot require signatures", name, kind));
                return self;
            }
            _ => {}
        }
        self.routes.insert(
            name.to_string(),
            Route {
                name: name.to_string(),
                kind,
                auth,
                handler: Box::new(Erased::new(handler)),
            },
        );
        self
    }

    pub fn query<H, M>(self, name: &str, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        self.route(name, MethodKind::Query, AuthPolicy::None, handler)
    }

    pub fn invoke<H, M>(self, name: &str, auth: AuthPolicy, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        self.route(name, MethodKind::Invoke, auth, handler)
    }

    pub fn invoke_tx<H, M>(self, name: &str, auth: AuthPolicy, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        self.route(name, MethodKind::InvokeTx, auth, handler)
    }

    pub fn invoke_nbtx<H, M>(self, name: &str, handler: H) -> Self
    where
        H: Handler<C, M>,
        M: 'static,
    {
        self.route(name, MethodKind::InvokeNbtx, AuthPolicy::None, handler)
    }

    /// Makes `target` reachable under a second name.
    pub fn alias(mut self, alias: &str, target: &str) -> Self {
        if RESERVED_FUNCTIONS.contains(&alias)
            || self.routes.contains_key(alias)
            || self.aliases.contains_key(alias)
        {
            self.problems.push(format!("alias {} collides with an existing name", alias));
            return self;
        }
        self.aliases.insert(alias.to_string(), target.to_string());
        self
    }

    pub(crate) fn note_problem(&mut self, problem: String) {
        self.problems.push(problem);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn build(self) -> LedgerResult<Router<C>> {
        let mut problems = self.problems;
        for (alias, target) in &self.aliases {
            if !self.routes.contains_key(target) {
                problems.push(format!("alias {} points at unknown method {}", alias, target));
            }
        }
        if !problems.is_empty() {
            return Err(LedgerError::Invariant(format!("router: {}", problems.join("; "))));
        }
        Ok(Router {
            routes: self.routes,
            aliases: self.aliases,
        })
    }
}

/// Immutable route table.
pub struct Router<C> {
    routes: BTreeMap<String, Route<C>>,
    aliases: BTreeMap<String, String>,
}

impl<C> Router<C> {
    pub fn get(&self, name: &str) -> Option<&Route<C>> {
        self.routes
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|target| self.routes.get(target)))
    }

    pub fn lookup(&self, name: &str) -> LedgerResult<&Route<C>> {
        self.get(name).ok_or_else(|| LedgerError::UnknownMethod(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route summaries in name order.
    pub fn describe(&self) -> Vec<RouteInfo> {
        self.routes.values().map(Route::info).collect()
    }
}

impl<C> fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}
