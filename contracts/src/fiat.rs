//! # Fiat Token Contract
//!
//! An issuer-backed currency. On top of the core's base token, transfer
//! and swap operations it adds:
//!
//! | Method      | Kind      | Auth   |                                       |
//! |-------------|-----------|--------|---------------------------------------|
//! | `emit`      | invoke-tx | admin  | credit new tokens to one holder       |
//! | `multiEmit` | invoke-tx | admin  | credit new tokens to several holders  |
//! | `redeem`    | invoke-tx | signed | burn the sender's own tokens          |
//!
//! Total emission is kept in the token config and moves with every emit
//! and redeem.

use serde::{Deserialize, Serialize};
use tracing::info;

use ledger_protocol::balance::{Holder, Namespace};
use ledger_protocol::router::Json;
use ledger_protocol::{
    swap, token, transfer, Address, AuthPolicy, BigInt, Contract, LedgerError, LedgerResult,
    RouterBuilder, TxContext,
};

/// The fiat token contract. Stateless: everything lives in the ledger.
#[derive(Debug, Default, Clone, Copy)]
pub struct FiatToken;

impl Contract for FiatToken {
    fn routes(builder: RouterBuilder<Self>) -> RouterBuilder<Self> {
        let builder = token::routes(builder);
        let builder = transfer::routes(builder);
        swap::routes(builder)
            .invoke_tx("emit", AuthPolicy::Admin, emit)
            .invoke_tx("multiEmit", AuthPolicy::Admin, multi_emit)
            .invoke_tx("redeem", AuthPolicy::Signed, redeem)
    }
}

/// One recipient of a `multiEmit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    pub to: Address,
    pub amount: BigInt,
}

fn credit(ctx: &mut TxContext<'_>, to: &Address, amount: &BigInt) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    ctx.balances("emit")?
        .add(Namespace::Token, Holder::from(to), "", amount)
}

fn record_emission(ctx: &mut TxContext<'_>, emitted: BigInt) -> LedgerResult<()> {
    let config = ctx.token_config_mut()?;
    config.total_emission = &config.total_emission + &emitted;
    ctx.save_token_config()
}

/// Credits `amount` new tokens to `to`.
pub fn emit(
    _: &FiatToken,
    ctx: &mut TxContext<'_>,
    to: Address,
    amount: BigInt,
) -> LedgerResult<()> {
    credit(ctx, &to, &amount)?;
    info!(%to, %amount, tx_id = ctx.tx_id(), "emitted");
    record_emission(ctx, amount)
}

pub fn multi_emit(
    _: &FiatToken,
    ctx: &mut TxContext<'_>,
    emissions: Json<Vec<Emission>>,
) -> LedgerResult<()> {
    if emissions.0.is_empty() {
        return Err(LedgerError::domain("nothing to emit"));
    }
    let mut total = BigInt::zero();
    for Emission { to, amount } in &emissions.0 {
        credit(ctx, to, amount)?;
        total = &total + amount;
    }
    info!(recipients = emissions.0.len(), %total, tx_id = ctx.tx_id(), "emitted");
    record_emission(ctx, total)
}

/// Burns `amount` of the sender's tokens. `reference` is the off-ledger
/// payout reference and is only logged.
pub fn redeem(
    _: &FiatToken,
    ctx: &mut TxContext<'_>,
    amount: BigInt,
    reference: String,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let holder = ctx.sender_address()?;
    ctx.balances("redeem")?
        .sub(Namespace::Token, Holder::from(&holder), "", &amount)?;
    let config = ctx.token_config_mut()?;
    config.total_emission = config
        .total_emission
        .checked_sub(&amount)
        .map_err(|_| LedgerError::Invariant("redeem exceeds total emission".into()))?;
    info!(%holder, %amount, reference = %reference, "redeemed");
    ctx.save_token_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_protocol::Chaincode;

    #[test]
    fn router_exposes_fiat_and_shared_operations() {
        let chaincode = Chaincode::new(FiatToken, Default::default()).unwrap();
        let router = chaincode.router();
        for name in [
            "emit",
            "multiEmit",
            "redeem",
            "transfer",
            "balanceOf",
            "channelTransferByCustomer",
            "createCCTransferTo",
            "swapBegin",
            "multiSwapDone",
            "batchTransaction",
        ] {
            assert!(router.get(name).is_some(), "{} is not routed", name);
        }
        assert_eq!(router.get("emit").unwrap().auth(), AuthPolicy::Admin);
    }
}
