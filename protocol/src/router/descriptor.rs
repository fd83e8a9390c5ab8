//! Descriptor-driven routing.
//!
//! A contract may publish its operations as a protobuf service. Each method
//! declares its type (`transaction`, `invoke` or `query`) and whether it is
//! authenticated; the single argument is the request message, accepted as
//! canonical JSON or binary protobuf.
//!
//! ```json
//! {
//!   "package": "token.v1",
//!   "service": "Token",
//!   "methods": [
//!     { "name": "Transfer", "method_type": "transaction", "auth": true },
//!     { "name": "Balance",  "method_type": "query" }
//!   ]
//! }
//! ```
//!
//! A method bound through [`ServiceRouter`] is reachable as its lowerCamel
//! name and as its full path, `/token.v1.Token/Transfer`.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::args::{decode_arg, encode_output, Proto};
use super::reflect::lower_camel;
use super::{AuthPolicy, Handler, MethodKind, RouterBuilder};
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodType {
    /// Deferred, executed by the batch executor.
    Transaction,
    /// Immediate write.
    Invoke,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub method_type: MethodType,
    #[serde(default)]
    pub auth: bool,
}

impl MethodDescriptor {
    pub fn classify(&self) -> (MethodKind, AuthPolicy) {
        match (self.method_type, self.auth) {
            (MethodType::Transaction, true) => (MethodKind::InvokeTx, AuthPolicy::Signed),
            (MethodType::Transaction, false) => (MethodKind::InvokeNbtx, AuthPolicy::None),
            (MethodType::Invoke, true) => (MethodKind::Invoke, AuthPolicy::Signed),
            (MethodType::Invoke, false) => (MethodKind::Invoke, AuthPolicy::None),
            (MethodType::Query, _) => (MethodKind::Query, AuthPolicy::None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub package: String,
    pub service: String,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn from_json(text: &str) -> LedgerResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// `package.Service`, or just `Service` without a package.
    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.service.clone()
        } else {
            format!("{}.{}", self.package, self.service)
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_path(&self, method: &str) -> String {
        format!("/{}/{}", self.full_name(), method)
    }
}

/// Marker for handlers bound through a descriptor.
pub struct ProtoMarker<Req, Resp>(PhantomData<fn(Req) -> Resp>);

/// Adapts `fn(&C, &mut TxContext, Req) -> LedgerResult<Resp>` to a
/// one-argument handler taking the request message.
pub struct ProtoHandler<F, Req, Resp> {
    f: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<C, F, Req, Resp> Handler<C, ProtoMarker<Req, Resp>> for ProtoHandler<F, Req, Resp>
where
    F: Fn(&C, &mut TxContext<'_>, Req) -> LedgerResult<Resp> + Send + Sync + 'static,
    Req: prost::Message + DeserializeOwned + Default + 'static,
    Resp: Serialize + 'static,
{
    fn arity(&self) -> usize {
        1
    }

    fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()> {
        let raw = args.first().map(Vec::as_slice).unwrap_or_default();
        decode_arg::<Proto<Req>>(raw, 0).map(|_| ())
    }

    fn call(
        &self,
        contract: &C,
        ctx: &mut TxContext<'_>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        let raw = args.first().map(Vec::as_slice).unwrap_or_default();
        let Proto(request) = decode_arg::<Proto<Req>>(raw, 0)?;
        encode_output(&(self.f)(contract, ctx, request)?)
    }
}

/// Binds handlers to the methods of one service.
pub struct ServiceRouter<'d, C> {
    builder: RouterBuilder<C>,
    descriptor: &'d ServiceDescriptor,
    bound: Vec<String>,
}

impl<'d, C: 'static> ServiceRouter<'d, C> {
    pub fn new(builder: RouterBuilder<C>, descriptor: &'d ServiceDescriptor) -> Self {
        Self {
            builder,
            descriptor,
            bound: Vec::new(),
        }
    }

    /// Binds `handler` to the descriptor method `method`.
    pub fn bind<F, Req, Resp>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&C, &mut TxContext<'_>, Req) -> LedgerResult<Resp> + Send + Sync + 'static,
        Req: prost::Message + DeserializeOwned + Default + 'static,
        Resp: Serialize + 'static,
    {
        let Some(desc) = self.descriptor.method(method) else {
            self.builder.note_problem(format!(
                "{} has no method {}",
                self.descriptor.full_name(),
                method
            ));
            return self;
        };
        let (kind, auth) = desc.classify();
        let name = lower_camel(method);
        let adapter = ProtoHandler {
            f: handler,
            _marker: PhantomData,
        };
        self.builder = self
            .builder
            .route(&name, kind, auth, adapter)
            .alias(&self.descriptor.method_path(method), &name);
        self.bound.push(method.to_string());
        self
    }

    fn unbound(&self) -> Option<String> {
        let missing: Vec<&str> = self
            .descriptor
            .methods
            .iter()
            .map(|m| m.name.as_str())
            .filter(|name| !self.bound.iter().any(|b| b == name))
            .collect();
        if missing.is_empty() {
            return None;
        }
        Some(format!("{}: unbound methods {}", self.descriptor.full_name(), missing.join(", ")))
    }

    /// Returns the builder; every descriptor method must have been bound.
    pub fn finish(self) -> LedgerResult<RouterBuilder<C>> {
        match self.unbound() {
            Some(problem) => Err(LedgerError::Invariant(problem)),
            None => Ok(self.builder),
        }
    }

    /// Returns the builder for use inside [`Contract::routes`]. Unbound
    /// methods are recorded as build problems, so the router fails to build
    /// instead of failing here.
    ///
    /// [`Contract::routes`]: crate::pipeline::Contract::routes
    pub fn register(mut self) -> RouterBuilder<C> {
        if let Some(problem) = self.unbound() {
            self.builder.note_problem(problem);
        }
        self.builder
    }
}
