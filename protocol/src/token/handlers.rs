//! Operations shared by every token contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{compute_fee, Fee, TokenConfig};
use crate::balance::{Holder, Namespace};
use crate::config::RATE_PRECISION;
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};
use crate::router::{AuthPolicy, RouterBuilder};
use crate::types::{Address, BigInt};

/// Deal type of the `buyToken` rate entries.
pub const DEAL_BUY_TOKEN: &str = "buyToken";

/// Deal type of the `buyBack` rate entries.
pub const DEAL_BUY_BACK: &str = "buyBack";

/// Registers the base token operations.
pub fn routes<C: 'static>(builder: RouterBuilder<C>) -> RouterBuilder<C> {
    builder
        .query("metadata", metadata::<C>)
        .query("balanceOf", balance_of::<C>)
        .query("allowedBalanceOf", allowed_balance_of::<C>)
        .query("lockedBalanceOf", locked_balance_of::<C>)
        .query("lockedAllowedBalanceOf", locked_allowed_balance_of::<C>)
        .query("givenBalance", given_balance::<C>)
        .query("allowedBalances", allowed_balances::<C>)
        .query("predictFee", predict_fee::<C>)
        .invoke_tx("transfer", AuthPolicy::Signed, transfer::<C>)
        .invoke_tx("setFee", AuthPolicy::Signed, set_fee::<C>)
        .invoke_tx("setFeeAddress", AuthPolicy::Signed, set_fee_address::<C>)
        .invoke_tx("setRate", AuthPolicy::Admin, set_rate::<C>)
        .invoke_tx("setLimits", AuthPolicy::Admin, set_limits::<C>)
        .invoke_tx("deleteRate", AuthPolicy::Admin, delete_rate::<C>)
        .invoke_tx("buyToken", AuthPolicy::Signed, buy_token::<C>)
        .invoke_tx("buyBack", AuthPolicy::Signed, buy_back::<C>)
        .invoke_tx("lockTokenBalance", AuthPolicy::Admin, lock_token_balance::<C>)
        .invoke_tx("unlockTokenBalance", AuthPolicy::Admin, unlock_token_balance::<C>)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn metadata<C>(_: &C, ctx: &mut TxContext<'_>) -> LedgerResult<TokenConfig> {
    ctx.token_config().cloned()
}

pub fn balance_of<C>(_: &C, ctx: &mut TxContext<'_>, address: Address) -> LedgerResult<BigInt> {
    ctx.balances("query")?.get(Namespace::Token, Holder::from(&address), "")
}

pub fn allowed_balance_of<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
    token: String,
) -> LedgerResult<BigInt> {
    ctx.balances("query")?.get(Namespace::Allowed, Holder::from(&address), &token)
}

pub fn locked_balance_of<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
) -> LedgerResult<BigInt> {
    ctx.balances("query")?.get(Namespace::TokenLocked, Holder::from(&address), "")
}

pub fn locked_allowed_balance_of<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
    token: String,
) -> LedgerResult<BigInt> {
    ctx.balances("query")?
        .get(Namespace::AllowedLocked, Holder::from(&address), &token)
}

/// Amount of the native token currently sitting on `channel`.
pub fn given_balance<C>(_: &C, ctx: &mut TxContext<'_>, channel: String) -> LedgerResult<BigInt> {
    ctx.balances("query")?.get(Namespace::Given, Holder::Channel(&channel), "")
}

pub fn allowed_balances<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
) -> LedgerResult<BTreeMap<String, BigInt>> {
    ctx.balances("query")?.aggregate(Namespace::Allowed, Holder::from(&address))
}

/// Fee a transfer of `amount` would pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedFee {
    pub currency: String,
    pub fee: BigInt,
}

pub fn predict_fee<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    amount: BigInt,
) -> LedgerResult<PredictedFee> {
    let config = ctx.token_config()?;
    Ok(match compute_fee(config, &amount)? {
        Some(charge) => PredictedFee {
            currency: charge.currency,
            fee: charge.amount,
        },
        None => PredictedFee {
            currency: config.symbol.clone(),
            fee: BigInt::zero(),
        },
    })
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// Moves `amount` of the native token to `to`, charging the configured fee
/// unless both sides belong to the same user.
pub fn transfer<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    to: Address,
    amount: BigInt,
    reference: String,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let sender = ctx.sender()?.clone();
    let recipient = ctx.resolve(to)?;
    let same_owner = sender.address() == &to || sender.same_user(&recipient);
    let fee = if same_owner {
        None
    } else {
        compute_fee(ctx.token_config()?, &amount)?
    };

    let from = *sender.address();
    ctx.balances("transfer")?.transfer(
        Namespace::Token,
        Holder::from(&from),
        Namespace::Token,
        Holder::from(&to),
        "",
        &amount,
    )?;

    if let Some(fee) = fee {
        let symbol = ctx.symbol()?;
        let collector = fee
            .collector
            .ok_or_else(|| LedgerError::domain("fee address is not set"))?;
        let (ns, token) = if fee.is_native(&symbol) {
            (Namespace::Token, "")
        } else {
            (Namespace::Allowed, fee.currency.as_str())
        };
        ctx.balances("fee")?.transfer(
            ns,
            Holder::from(&from),
            ns,
            Holder::from(&collector),
            token,
            &fee.amount,
        )?;
    }
    debug!(%from, %to, %amount, reference = %reference, tx_id = ctx.tx_id(), "transfer");
    Ok(())
}

// ---------------------------------------------------------------------------
// Fee and rate administration
// ---------------------------------------------------------------------------

pub fn set_fee<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    currency: String,
    rate: BigInt,
    floor: BigInt,
    cap: BigInt,
) -> LedgerResult<()> {
    let sender = ctx.sender_address()?;
    if sender != ctx.token_config()?.fee_setter() {
        return Err(LedgerError::Unauthorized);
    }
    if rate > BigInt::from(RATE_PRECISION) {
        return Err(LedgerError::domain("fee should be equal or less than 100%"));
    }
    if !cap.is_zero() && floor > cap {
        return Err(LedgerError::domain("fee floor should not exceed the cap"));
    }
    let config = ctx.token_config_mut()?;
    let collector = config.fee.as_ref().and_then(|f| f.collector);
    let currency = if currency.is_empty() { config.symbol.clone() } else { currency };
    config.fee = Some(Fee {
        currency,
        rate,
        floor,
        cap,
        collector,
    });
    info!(tx_id = ctx.tx_id(), "fee updated");
    ctx.save_token_config()
}

pub fn set_fee_address<C>(_: &C, ctx: &mut TxContext<'_>, collector: Address) -> LedgerResult<()> {
    let sender = ctx.sender_address()?;
    if sender != ctx.token_config()?.fee_address_setter() {
        return Err(LedgerError::Unauthorized);
    }
    let config = ctx.token_config_mut()?;
    let symbol = config.symbol.clone();
    config
        .fee
        .get_or_insert_with(|| Fee {
            currency: symbol,
            ..Fee::default()
        })
        .collector = Some(collector);
    info!(%collector, "fee collector updated");
    ctx.save_token_config()
}

pub fn set_rate<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    deal_type: String,
    currency: String,
    rate: BigInt,
) -> LedgerResult<()> {
    if rate.is_zero() {
        return Err(LedgerError::domain("trying to set rate = 0"));
    }
    let config = ctx.token_config_mut()?;
    if currency == config.symbol {
        return Err(LedgerError::domain("currency is equals token: it is impossible"));
    }
    config.set_rate(&deal_type, &currency, rate);
    ctx.save_token_config()
}

pub fn set_limits<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    deal_type: String,
    currency: String,
    min: BigInt,
    max: BigInt,
) -> LedgerResult<()> {
    if !max.is_zero() && min > max {
        return Err(LedgerError::domain("min limit is greater than max limit"));
    }
    let config = ctx.token_config_mut()?;
    let entry = config
        .rates
        .iter_mut()
        .find(|r| r.deal_type == deal_type && r.currency == currency)
        .ok_or_else(|| LedgerError::domain("rate is not set"))?;
    entry.min = min;
    entry.max = max;
    ctx.save_token_config()
}

pub fn delete_rate<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    deal_type: String,
    currency: String,
) -> LedgerResult<()> {
    if !ctx.token_config_mut()?.delete_rate(&deal_type, &currency) {
        return Err(LedgerError::domain("rate is not set"));
    }
    ctx.save_token_config()
}

// ---------------------------------------------------------------------------
// Exchange against the issuer
// ---------------------------------------------------------------------------

/// Pays `amount` of `currency` to the issuer and receives native tokens at
/// the `buyToken` rate.
pub fn buy_token<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    amount: BigInt,
    currency: String,
) -> LedgerResult<BigInt> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let buyer = ctx.sender_address()?;
    let config = ctx.token_config()?;
    if currency == config.symbol {
        return Err(LedgerError::domain("impossible to buy for this currency"));
    }
    let rate = config
        .rate(DEAL_BUY_TOKEN, &currency)
        .ok_or_else(|| LedgerError::domain("impossible to buy for this currency"))?;
    rate.check_limits(&amount)?;
    let tokens = amount.mul_div(&BigInt::from(RATE_PRECISION), &rate.rate)?;
    if tokens.is_zero() {
        return Err(LedgerError::domain("amount is too small"));
    }
    let issuer = config.issuer;

    let mut balances = ctx.balances("buyToken")?;
    balances.transfer(
        Namespace::Allowed,
        Holder::from(&buyer),
        Namespace::Allowed,
        Holder::from(&issuer),
        &currency,
        &amount,
    )?;
    balances.transfer(
        Namespace::Token,
        Holder::from(&issuer),
        Namespace::Token,
        Holder::from(&buyer),
        "",
        &tokens,
    )?;
    Ok(tokens)
}

/// Sells `amount` native tokens back to the issuer for `currency` at the
/// `buyBack` rate.
pub fn buy_back<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    amount: BigInt,
    currency: String,
) -> LedgerResult<BigInt> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let seller = ctx.sender_address()?;
    let config = ctx.token_config()?;
    let rate = config
        .rate(DEAL_BUY_BACK, &currency)
        .ok_or_else(|| LedgerError::domain("impossible to buy back for this currency"))?;
    rate.check_limits(&amount)?;
    let payout = amount.mul_div(&rate.rate, &BigInt::from(RATE_PRECISION))?;
    if payout.is_zero() {
        return Err(LedgerError::domain("amount is too small"));
    }
    let issuer = config.issuer;

    let mut balances = ctx.balances("buyBack")?;
    balances.transfer(
        Namespace::Token,
        Holder::from(&seller),
        Namespace::Token,
        Holder::from(&issuer),
        "",
        &amount,
    )?;
    balances.transfer(
        Namespace::Allowed,
        Holder::from(&issuer),
        Namespace::Allowed,
        Holder::from(&seller),
        &currency,
        &payout,
    )?;
    Ok(payout)
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

pub fn lock_token_balance<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
    amount: BigInt,
) -> LedgerResult<()> {
    ctx.balances("lock")?.transfer(
        Namespace::Token,
        Holder::from(&address),
        Namespace::TokenLocked,
        Holder::from(&address),
        "",
        &amount,
    )
}

pub fn unlock_token_balance<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    address: Address,
    amount: BigInt,
) -> LedgerResult<()> {
    ctx.balances("unlock")?.transfer(
        Namespace::TokenLocked,
        Holder::from(&address),
        Namespace::Token,
        Holder::from(&address),
        "",
        &amount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{KeyType, Keypair};
    use crate::testing::Fixture;
    use crate::types::AccountRef;

    struct Token;

    fn n(v: u64) -> BigInt {
        BigInt::from(v)
    }

    fn addr(seed: &[u8]) -> Address {
        Address::from_public_key(seed)
    }

    fn fund(fx: &mut Fixture, ns: Namespace, who: Address, token: &str, amount: u64) {
        fx.run(None, |ctx| {
            ctx.balances("seed")
                .unwrap()
                .add(ns, Holder::from(&who), token, &n(amount))
                .unwrap()
        });
    }

    fn as_user(address: Address, user: &str) -> Option<AccountRef> {
        Some(AccountRef::resolved(address, user))
    }

    fn configure_fee(fx: &mut Fixture, collector: Address) {
        let issuer = fx.issuer;
        fx.run(as_user(issuer, "issuer"), |ctx| {
            set_fee(&Token, ctx, "FIAT".into(), n(500_000), n(1), n(100)).unwrap();
            set_fee_address(&Token, ctx, collector).unwrap();
        });
    }

    #[test]
    fn transfer_charges_fee_to_collector() {
        let mut fx = Fixture::new();
        let (sender, recipient, collector) = (addr(b"s"), addr(b"r"), addr(b"f"));
        configure_fee(&mut fx, collector);
        fund(&mut fx, Namespace::Token, sender, "", 3);

        fx.run(as_user(sender, "alice"), |ctx| {
            transfer(&Token, ctx, recipient, n(1), "ref".into()).unwrap();
            assert_eq!(balance_of(&Token, ctx, sender).unwrap(), n(1));
            assert_eq!(balance_of(&Token, ctx, recipient).unwrap(), n(1));
            assert_eq!(balance_of(&Token, ctx, collector).unwrap(), n(1));
        });
    }

    #[test]
    fn same_user_pays_no_fee() {
        let mut fx = Fixture::new();
        let collector = addr(b"f");
        configure_fee(&mut fx, collector);
        let key = |seed: u8| {
            Keypair::from_seed(KeyType::Ed25519, &[seed; 32])
                .unwrap()
                .public_key()
        };
        let a = fx.acl.register("alice", vec![key(1)]);
        let a2 = fx.acl.register("alice", vec![key(2)]);
        let b = fx.acl.register("bob", vec![key(3)]);
        fund(&mut fx, Namespace::Token, a, "", 3);

        fx.run(as_user(a, "alice"), |ctx| {
            transfer(&Token, ctx, a, n(1), String::new()).unwrap();
            assert_eq!(balance_of(&Token, ctx, a).unwrap(), n(3));
            transfer(&Token, ctx, a2, n(1), String::new()).unwrap();
            assert_eq!(balance_of(&Token, ctx, a2).unwrap(), n(1));
            assert_eq!(balance_of(&Token, ctx, collector).unwrap(), n(0));
        });
        fx.run(as_user(a, "alice"), |ctx| {
            transfer(&Token, ctx, b, n(1), String::new()).unwrap();
            assert_eq!(balance_of(&Token, ctx, collector).unwrap(), n(1));
            assert_eq!(balance_of(&Token, ctx, a).unwrap(), n(0));
        });
    }

    #[test]
    fn transfer_fails_without_funds_for_fee() {
        let mut fx = Fixture::new();
        let (sender, recipient, collector) = (addr(b"s"), addr(b"r"), addr(b"f"));
        configure_fee(&mut fx, collector);
        fund(&mut fx, Namespace::Token, sender, "", 1);
        let result = fx.run(as_user(sender, "alice"), |ctx| {
            transfer(&Token, ctx, recipient, n(1), String::new())
        });
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
    }

    #[test]
    fn fee_setters_are_enforced() {
        let mut fx = Fixture::new();
        let stranger = addr(b"x");
        let result = fx.run(as_user(stranger, "x"), |ctx| {
            set_fee(&Token, ctx, String::new(), n(1), n(0), n(0))
        });
        assert!(matches!(result, Err(LedgerError::Unauthorized)));
        let issuer = fx.issuer;
        let result = fx.run(as_user(issuer, "i"), |ctx| {
            set_fee(&Token, ctx, String::new(), n(RATE_PRECISION + 1), n(0), n(0))
        });
        assert!(result.is_err());
    }

    #[test]
    fn predict_matches_charge() {
        let mut fx = Fixture::new();
        configure_fee(&mut fx, addr(b"f"));
        let predicted = fx.run(None, |ctx| predict_fee(&Token, ctx, n(100_000)).unwrap());
        assert_eq!(predicted.fee, n(100));
        assert_eq!(predicted.currency, "FIAT");
    }

    #[test]
    fn rate_administration() {
        let mut fx = Fixture::new();
        fx.run(None, |ctx| {
            assert!(set_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(0)).is_err());
            assert!(set_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "FIAT".into(), n(1)).is_err());
            set_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(200_000_000)).unwrap();
            let unknown = set_limits(&Token, ctx, DEAL_BUY_TOKEN.into(), "EUR".into(), n(1), n(2));
            assert!(unknown.is_err());
            let inverted = set_limits(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(5), n(2));
            assert!(inverted.is_err());
            set_limits(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(2), n(100)).unwrap();
        });
        let rate = fx.run(None, |ctx| {
            ctx.token_config().unwrap().rate(DEAL_BUY_TOKEN, "USD").cloned()
        });
        assert_eq!(rate.unwrap().min, n(2));
        fx.run(None, |ctx| {
            delete_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into()).unwrap();
            assert!(delete_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into()).is_err());
        });
    }

    #[test]
    fn buy_and_buy_back() {
        let mut fx = Fixture::new();
        let issuer = fx.issuer;
        let buyer = addr(b"buyer");
        fund(&mut fx, Namespace::Token, issuer, "", 1000);
        fund(&mut fx, Namespace::Allowed, buyer, "USD", 50);
        fx.run(None, |ctx| {
            // 2 USD per token
            set_rate(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(200_000_000)).unwrap();
            set_limits(&Token, ctx, DEAL_BUY_TOKEN.into(), "USD".into(), n(10), n(40)).unwrap();
            set_rate(&Token, ctx, DEAL_BUY_BACK.into(), "USD".into(), n(100_000_000)).unwrap();
        });

        let out = fx.run(as_user(buyer, "b"), |ctx| buy_token(&Token, ctx, n(50), "USD".into()));
        assert!(matches!(out, Err(LedgerError::AmountOutOfLimits)));

        fx.run(as_user(buyer, "b"), |ctx| {
            assert_eq!(buy_token(&Token, ctx, n(20), "USD".into()).unwrap(), n(10));
            assert_eq!(balance_of(&Token, ctx, buyer).unwrap(), n(10));
            assert_eq!(allowed_balance_of(&Token, ctx, buyer, "USD".into()).unwrap(), n(30));
            assert_eq!(buy_back(&Token, ctx, n(4), "USD".into()).unwrap(), n(4));
            assert_eq!(balance_of(&Token, ctx, buyer).unwrap(), n(6));
            assert_eq!(allowed_balance_of(&Token, ctx, buyer, "USD".into()).unwrap(), n(34));
        });
    }

    #[test]
    fn lock_and_unlock() {
        let mut fx = Fixture::new();
        let user = addr(b"u");
        fund(&mut fx, Namespace::Token, user, "", 10);
        fx.run(None, |ctx| {
            lock_token_balance(&Token, ctx, user, n(4)).unwrap();
            assert_eq!(balance_of(&Token, ctx, user).unwrap(), n(6));
            assert_eq!(locked_balance_of(&Token, ctx, user).unwrap(), n(4));
            assert!(unlock_token_balance(&Token, ctx, user, n(5)).is_err());
            unlock_token_balance(&Token, ctx, user, n(4)).unwrap();
            assert_eq!(locked_balance_of(&Token, ctx, user).unwrap(), n(0));
        });
    }

    #[test]
    fn aggregated_allowed_balances() {
        let mut fx = Fixture::new();
        let user = addr(b"u");
        fund(&mut fx, Namespace::Allowed, user, "USD", 3);
        fund(&mut fx, Namespace::Allowed, user, "EUR", 2);
        let all = fx.run(None, |ctx| allowed_balances(&Token, ctx, user).unwrap());
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["EUR", "USD"]);
    }
}
