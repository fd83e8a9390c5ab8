//! Multi-asset swap handlers.

use super::{begin, cancel, confirm, create_target, done, load_existing, Swap, SwapKind};
use crate::context::TxContext;
use crate::error::LedgerResult;
use crate::router::{AuthPolicy, Json, RouterBuilder};
use crate::transfer::TransferItem;

pub(super) fn routes<C: 'static>(builder: RouterBuilder<C>) -> RouterBuilder<C> {
    builder
        .invoke_tx("multiSwapBegin", AuthPolicy::Signed, multi_swap_begin::<C>)
        .query("multiSwapGet", multi_swap_get::<C>)
        .invoke("multiSwapCreateTarget", AuthPolicy::None, multi_swap_create_target::<C>)
        .invoke("multiSwapDone", AuthPolicy::None, multi_swap_done::<C>)
        .invoke("multiSwapConfirm", AuthPolicy::None, multi_swap_confirm::<C>)
        .invoke_tx("multiSwapCancel", AuthPolicy::Signed, multi_swap_cancel::<C>)
}

pub fn multi_swap_begin<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    to: String,
    assets: Json<Vec<TransferItem>>,
    hash: String,
) -> LedgerResult<String> {
    begin(ctx, SwapKind::Multi, to, assets.0, hash).map(|s| s.id)
}

pub fn multi_swap_get<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<Swap> {
    load_existing(ctx, SwapKind::Multi, &id)
}

pub fn multi_swap_create_target<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    swap: Json<Swap>,
) -> LedgerResult<()> {
    create_target(ctx, SwapKind::Multi, swap.0)
}

pub fn multi_swap_done<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    key: String,
) -> LedgerResult<()> {
    done(ctx, SwapKind::Multi, &id, &key)
}

pub fn multi_swap_confirm<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    key: String,
) -> LedgerResult<()> {
    confirm(ctx, SwapKind::Multi, &id, &key)
}

pub fn multi_swap_cancel<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    cancel(ctx, SwapKind::Multi, &id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{Holder, Namespace};
    use crate::swap::Leg;
    use crate::crypto::sha3_256;
    use crate::testing::Fixture;
    use crate::token::handlers::{locked_allowed_balance_of, locked_balance_of};
    use crate::types::{AccountRef, Address, BigInt};

    struct Token;

    #[test]
    fn multi_swap_locks_every_asset() {
        let mut fx = Fixture::new();
        let owner = Address::from_public_key(b"owner");
        fx.run(None, |ctx| {
            let mut balances = ctx.balances("seed").unwrap();
            balances.add(Namespace::Token, Holder::from(&owner), "", &BigInt::from(10)).unwrap();
            balances.add(Namespace::Allowed, Holder::from(&owner), "CC", &BigInt::from(5)).unwrap();
        });
        let assets = vec![
            TransferItem {
                token: "FIAT".into(),
                amount: BigInt::from(3),
            },
            TransferItem {
                token: "cc".into(),
                amount: BigInt::from(2),
            },
        ];
        let hash = hex::encode(sha3_256(b"k"));
        let id = fx.run(Some(AccountRef::unresolved(owner)), |ctx| {
            multi_swap_begin(&Token, ctx, "cc".into(), Json(assets), hash).unwrap()
        });
        fx.run(None, |ctx| {
            assert_eq!(multi_swap_get(&Token, ctx, id.clone()).unwrap().assets.len(), 2);
            assert_eq!(locked_balance_of(&Token, ctx, owner).unwrap(), BigInt::from(3));
            assert_eq!(
                locked_allowed_balance_of(&Token, ctx, owner, "CC".into()).unwrap(),
                BigInt::from(2)
            );
            multi_swap_confirm(&Token, ctx, id.clone(), "k".into()).unwrap();
            assert_eq!(locked_balance_of(&Token, ctx, owner).unwrap(), BigInt::zero());
        });
    }

    #[test]
    fn expired_multi_swap_target_refuses_the_key() {
        let mut fx = Fixture::new();
        let owner = Address::from_public_key(b"owner");
        let incoming = Swap {
            id: "m1".into(),
            owner,
            assets: vec![TransferItem {
                token: "CC".into(),
                amount: BigInt::from(4),
            }],
            from: "cc".into(),
            to: "ch".into(),
            hash: hex::encode(sha3_256(b"k")),
            timeout: fx.world.now().timestamp() + 60,
            leg: Leg::Source,
        };
        fx.run(None, |ctx| multi_swap_create_target(&Token, ctx, Json(incoming)).unwrap());
        fx.world.advance(chrono::Duration::minutes(5));
        fx.run(None, |ctx| {
            assert!(multi_swap_done(&Token, ctx, "m1".into(), "k".into()).is_err());
            assert!(multi_swap_get(&Token, ctx, "m1".into()).is_ok());
        });
    }

    #[test]
    fn multi_swap_cancel_waits_out_the_grace_period() {
        let mut fx = Fixture::new();
        let owner = Address::from_public_key(b"owner");
        fx.run(None, |ctx| {
            let mut balances = ctx.balances("seed").unwrap();
            balances.add(Namespace::Token, Holder::from(&owner), "", &BigInt::from(10)).unwrap();
        });
        let assets = vec![TransferItem {
            token: "FIAT".into(),
            amount: BigInt::from(6),
        }];
        let hash = hex::encode(sha3_256(b"k"));
        let sender = Some(AccountRef::unresolved(owner));
        let id = fx.run(sender.clone(), |ctx| {
            multi_swap_begin(&Token, ctx, "cc".into(), Json(assets), hash).unwrap()
        });

        fx.world.advance(chrono::Duration::hours(3));
        assert!(fx.run(sender.clone(), |ctx| multi_swap_cancel(&Token, ctx, id.clone())).is_err());

        fx.world.advance(chrono::Duration::hours(1));
        fx.run(sender, |ctx| {
            multi_swap_cancel(&Token, ctx, id.clone()).unwrap();
            assert_eq!(locked_balance_of(&Token, ctx, owner).unwrap(), BigInt::zero());
        });
    }
}
