//! Typed handler binding.
//!
//! Any function shaped like
//!
//! ```text
//! fn(&Contract, &mut TxContext, A1, ..., An) -> LedgerResult<R>
//! ```
//!
//! with `n <= 6`, every `Ai: Param` and `R: Serialize`, is a [`Handler`].
//! The router stores handlers type-erased behind [`ErasedHandler`], so a
//! single table holds methods of every signature.

use std::marker::PhantomData;

use serde::Serialize;

use super::args::{decode_arg, encode_output, Param};
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};

/// A callable bound to a contract type `C`. `M` is a marker that keeps the
/// blanket implementations for different arities apart.
pub trait Handler<C, M>: Send + Sync + 'static {
    /// Number of method arguments.
    fn arity(&self) -> usize;

    /// Decodes every argument without running the handler.
    fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()>;

    /// Decodes the arguments, runs the handler and serialises its result.
    fn call(
        &self,
        contract: &C,
        ctx: &mut TxContext<'_>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>>;
}

fn arg_at(args: &[Vec<u8>], index: usize) -> LedgerResult<&[u8]> {
    args.get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| LedgerError::Malformed(format!("missing argument {}", index)))
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_variables, unused_mut, unused_assignments)]
        impl<C, F, R, $($ty,)*> Handler<C, (R, $($ty,)*)> for F
        where
            F: Fn(&C, &mut TxContext<'_>, $($ty,)*) -> LedgerResult<R> + Send + Sync + 'static,
            R: Serialize + 'static,
            $($ty: Param + 'static,)*
        {
            fn arity(&self) -> usize {
                count!($($ty)*)
            }

            fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()> {
                let mut index = 0usize;
                $(
                    decode_arg::<$ty>(arg_at(args, index)?, index)?;
                    index += 1;
                )*
                Ok(())
            }

            fn call(
                &self,
                contract: &C,
                ctx: &mut TxContext<'_>,
                args: &[Vec<u8>],
            ) -> LedgerResult<Vec<u8>> {
                let mut index = 0usize;
                $(
                    let $ty = decode_arg::<$ty>(arg_at(args, index)?, index)?;
                    index += 1;
                )*
                let output = (self)(contract, ctx, $($ty,)*)?;
                encode_output(&output)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);

/// Object-safe view of a [`Handler`].
pub trait ErasedHandler<C>: Send + Sync {
    fn arity(&self) -> usize;
    fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()>;
    fn call(
        &self,
        contract: &C,
        ctx: &mut TxContext<'_>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>>;
}

pub(crate) struct Erased<H, M> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

impl<H, M> Erased<H, M> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<C, H, M> ErasedHandler<C> for Erased<H, M>
where
    H: Handler<C, M>,
    M: 'static,
{
    fn arity(&self) -> usize {
        self.handler.arity()
    }

    fn check(&self, args: &[Vec<u8>]) -> LedgerResult<()> {
        self.handler.check(args)
    }

    fn call(
        &self,
        contract: &C,
        ctx: &mut TxContext<'_>,
        args: &[Vec<u8>],
    ) -> LedgerResult<Vec<u8>> {
        self.handler.call(contract, ctx, args)
    }
}
