//! # Swaps
//!
//! Hash-time-locked exchange between two channels. The owner locks assets
//! on the source channel against `hash = sha3-256(key)`; a relay mirrors
//! the record on the target channel; whoever reveals `key` there before
//! the swap expires credits the owner, and the relay then confirms on the
//! source with the same key, which burns the lock. The target stops
//! accepting the key at expiry. The owner may cancel the source leg only
//! once a grace period past expiry has elapsed, so a redemption made just
//! before expiry is always confirmed before a refund becomes possible.
//!
//! A single swap and a multi-swap differ only in the number of assets and
//! the table they are stored in.

mod multi;

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::balance::{Holder, Namespace};
use crate::config::{KEY_MULTI_SWAP, KEY_SWAP};
use crate::context::TxContext;
use crate::crypto::sha3_256;
use crate::error::{LedgerError, LedgerResult};
use crate::router::{AuthPolicy, Json, RouterBuilder};
use crate::stub::composite::create_composite_key;
use crate::transfer::{normalize_items, TransferItem};
use crate::types::proto::{self, AssetRecord, SwapLeg, SwapRecord};
use crate::types::{Address, BigInt};

/// Single or multi-asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapKind {
    Single,
    Multi,
}

impl SwapKind {
    fn object_type(self) -> &'static str {
        match self {
            SwapKind::Single => KEY_SWAP,
            SwapKind::Multi => KEY_MULTI_SWAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Leg {
    Source,
    Target,
}

/// A swap in the form relays read and write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: String,
    pub owner: Address,
    pub assets: Vec<TransferItem>,
    pub from: String,
    pub to: String,
    /// Hex SHA3-256 of the key.
    pub hash: String,
    /// Expiry, unix seconds.
    pub timeout: i64,
    pub leg: Leg,
}

impl Swap {
    pub fn to_record(&self) -> LedgerResult<SwapRecord> {
        Ok(SwapRecord {
            id: self.id.clone(),
            owner: self.owner.as_bytes().to_vec(),
            assets: self
                .assets
                .iter()
                .map(|a| AssetRecord {
                    token: a.token.clone(),
                    amount: a.amount.to_bytes(),
                })
                .collect(),
            from: self.from.clone(),
            to: self.to.clone(),
            hash: decode_hash(&self.hash)?.to_vec(),
            timeout: self.timeout,
            leg: match self.leg {
                Leg::Source => SwapLeg::Source,
                Leg::Target => SwapLeg::Target,
            } as i32,
        })
    }

    pub fn from_record(record: SwapRecord) -> LedgerResult<Self> {
        let leg = match SwapLeg::try_from(record.leg) {
            Ok(SwapLeg::Source) => Leg::Source,
            Ok(SwapLeg::Target) => Leg::Target,
            _ => {
                return Err(LedgerError::Invariant(format!(
                    "swap leg {} is not valid",
                    record.leg
                )))
            }
        };
        Ok(Self {
            owner: Address::from_slice(&record.owner)?,
            assets: record
                .assets
                .into_iter()
                .map(|a| TransferItem {
                    token: a.token,
                    amount: BigInt::from_bytes(&a.amount),
                })
                .collect(),
            hash: hex::encode(&record.hash),
            id: record.id,
            from: record.from,
            to: record.to,
            timeout: record.timeout,
            leg,
        })
    }

    /// Returns `true` if `key` opens this swap.
    pub fn opens_with(&self, key: &str) -> bool {
        hex::encode(sha3_256(key.as_bytes())).eq_ignore_ascii_case(&self.hash)
    }
}

fn decode_hash(text: &str) -> LedgerResult<[u8; 32]> {
    let bytes = hex::decode(text)
        .map_err(|e| LedgerError::Malformed(format!("swap hash is not hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| LedgerError::Malformed("swap hash must be 32 bytes".into()))
}

pub fn key(kind: SwapKind, id: &str) -> LedgerResult<String> {
    create_composite_key(kind.object_type(), &[id])
}

pub fn load(ctx: &TxContext<'_>, kind: SwapKind, id: &str) -> LedgerResult<Option<Swap>> {
    match ctx.stub().get_state(&key(kind, id)?)? {
        Some(bytes) => Ok(Some(Swap::from_record(proto::decode(&bytes)?)?)),
        None => Ok(None),
    }
}

fn load_existing(ctx: &TxContext<'_>, kind: SwapKind, id: &str) -> LedgerResult<Swap> {
    load(ctx, kind, id)?.ok_or_else(|| LedgerError::domain(format!("swap {} not found", id)))
}

fn save(ctx: &mut TxContext<'_>, kind: SwapKind, swap: &Swap) -> LedgerResult<()> {
    let record = swap.to_record()?;
    ctx.stub_mut().put_state(&key(kind, &swap.id)?, proto::encode(&record))
}

fn remove(ctx: &mut TxContext<'_>, kind: SwapKind, id: &str) -> LedgerResult<()> {
    let key = key(kind, id)?;
    ctx.stub_mut().del_state(&key)
}

/// Registers single and multi-asset swap operations.
pub fn routes<C: 'static>(builder: RouterBuilder<C>) -> RouterBuilder<C> {
    let builder = builder
        .invoke_tx("swapBegin", AuthPolicy::Signed, swap_begin::<C>)
        .query("swapGet", swap_get::<C>)
        .invoke("swapCreateTarget", AuthPolicy::None, swap_create_target::<C>)
        .invoke("swapDone", AuthPolicy::None, swap_done::<C>)
        .invoke("swapConfirm", AuthPolicy::None, swap_confirm::<C>)
        .invoke_tx("swapCancel", AuthPolicy::Signed, swap_cancel::<C>);
    multi::routes(builder)
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

fn is_native(symbol: &str, token: &str) -> bool {
    token.eq_ignore_ascii_case(symbol)
}

/// Source: locks the assets and stores the source leg. The swap id is the
/// id of the transaction that began it.
pub(crate) fn begin(
    ctx: &mut TxContext<'_>,
    kind: SwapKind,
    to: String,
    assets: Vec<TransferItem>,
    hash: String,
) -> LedgerResult<Swap> {
    let owner = ctx.sender_address()?;
    let from = ctx.channel_id().to_string();
    if to.eq_ignore_ascii_case(&from) {
        return Err(LedgerError::domain("impossible to swap within the same channel"));
    }
    if !ctx.settings().accepts_channel(&to) {
        return Err(LedgerError::domain(format!("channel {} is not a swap peer", to)));
    }
    decode_hash(&hash)?;
    let assets = normalize_items(assets)?;
    let symbol = ctx.symbol()?;
    if let Some(asset) = assets
        .iter()
        .find(|a| !is_native(&symbol, &a.token) && !a.token.eq_ignore_ascii_case(&to))
    {
        return Err(LedgerError::domain(format!(
            "incorrect token {} for swap to {}",
            asset.token, to
        )));
    }
    let id = ctx.tx_id().to_string();
    if load(ctx, kind, &id)?.is_some() {
        return Err(LedgerError::domain("swap already exists"));
    }

    {
        let mut balances = ctx.balances("swapBegin")?;
        for asset in &assets {
            let (free, locked, token) = if is_native(&symbol, &asset.token) {
                (Namespace::Token, Namespace::TokenLocked, "")
            } else {
                (Namespace::Allowed, Namespace::AllowedLocked, asset.token.as_str())
            };
            balances.transfer(
                free,
                Holder::from(&owner),
                locked,
                Holder::from(&owner),
                token,
                &asset.amount,
            )?;
        }
    }

    let swap = Swap {
        id,
        owner,
        assets,
        from,
        to,
        hash,
        timeout: ctx.timestamp().timestamp() + ctx.settings().swap_timeout_secs,
        leg: Leg::Source,
    };
    save(ctx, kind, &swap)?;
    info!(id = %swap.id, to = %swap.to, %owner, "swap begun");
    Ok(swap)
}

/// Target: stores the mirrored record, relay only.
pub(crate) fn create_target(
    ctx: &mut TxContext<'_>,
    kind: SwapKind,
    mut swap: Swap,
) -> LedgerResult<()> {
    ctx.require_relay()?;
    if !swap.to.eq_ignore_ascii_case(ctx.channel_id()) {
        return Err(LedgerError::ChannelMismatch {
            expected: ctx.channel_id().to_string(),
            got: swap.to,
        });
    }
    if load(ctx, kind, &swap.id)?.is_some() {
        return Ok(());
    }
    decode_hash(&swap.hash)?;
    swap.assets = normalize_items(swap.assets)?;
    swap.leg = Leg::Target;
    save(ctx, kind, &swap)?;
    debug!(id = %swap.id, "swap target created");
    Ok(())
}

/// Target: reveals the key and credits the owner.
pub(crate) fn done(
    ctx: &mut TxContext<'_>,
    kind: SwapKind,
    id: &str,
    key: &str,
) -> LedgerResult<()> {
    let swap = load_existing(ctx, kind, id)?;
    if swap.leg != Leg::Target {
        return Err(LedgerError::domain("swap is not a target leg"));
    }
    if ctx.timestamp().timestamp() >= swap.timeout {
        return Err(LedgerError::domain(format!("swap {} has expired", id)));
    }
    if !swap.opens_with(key) {
        return Err(LedgerError::domain("incorrect swap key"));
    }
    let symbol = ctx.symbol()?;
    {
        let mut balances = ctx.balances("swapDone")?;
        for asset in &swap.assets {
            if is_native(&symbol, &asset.token) {
                balances.sub(Namespace::Given, Holder::Channel(&swap.from), "", &asset.amount)?;
                balances.add(Namespace::Token, Holder::from(&swap.owner), "", &asset.amount)?;
            } else {
                balances.add(
                    Namespace::Allowed,
                    Holder::from(&swap.owner),
                    &asset.token,
                    &asset.amount,
                )?;
            }
        }
    }
    remove(ctx, kind, id)?;
    info!(%id, owner = %swap.owner, "swap done");
    Ok(())
}

/// Source: the key was revealed on the target, burn the lock. Relay only;
/// a missing source leg means the step already ran.
pub(crate) fn confirm(
    ctx: &mut TxContext<'_>,
    kind: SwapKind,
    id: &str,
    key: &str,
) -> LedgerResult<()> {
    ctx.require_relay()?;
    let Some(swap) = load(ctx, kind, id)? else {
        return Ok(());
    };
    if swap.leg != Leg::Source {
        return Err(LedgerError::domain("swap is not a source leg"));
    }
    if !swap.opens_with(key) {
        return Err(LedgerError::domain("incorrect swap key"));
    }
    let symbol = ctx.symbol()?;
    {
        let mut balances = ctx.balances("swapConfirm")?;
        for asset in &swap.assets {
            if is_native(&symbol, &asset.token) {
                balances.sub(Namespace::TokenLocked, Holder::from(&swap.owner), "", &asset.amount)?;
                balances.add(Namespace::Given, Holder::Channel(&swap.to), "", &asset.amount)?;
            } else {
                balances.sub(
                    Namespace::AllowedLocked,
                    Holder::from(&swap.owner),
                    &asset.token,
                    &asset.amount,
                )?;
            }
        }
    }
    remove(ctx, kind, id)?;
    debug!(%id, "swap confirmed");
    Ok(())
}

/// Source: the owner takes the lock back once the swap has expired and the
/// cancel grace period has passed.
pub(crate) fn cancel(ctx: &mut TxContext<'_>, kind: SwapKind, id: &str) -> LedgerResult<()> {
    let swap = load_existing(ctx, kind, id)?;
    if swap.leg != Leg::Source {
        return Err(LedgerError::domain("swap is not a source leg"));
    }
    if ctx.sender_address()? != swap.owner {
        return Err(LedgerError::Unauthorized);
    }
    let cancellable_at = ctx.settings().swap_cancellable_at(swap.timeout);
    if ctx.timestamp().timestamp() < cancellable_at {
        let wait_until = chrono::Utc
            .timestamp_opt(cancellable_at, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| cancellable_at.to_string());
        return Err(LedgerError::domain(format!(
            "swap cannot be cancelled yet, wait until {}",
            wait_until
        )));
    }
    let symbol = ctx.symbol()?;
    {
        let mut balances = ctx.balances("swapCancel")?;
        for asset in &swap.assets {
            let (free, locked, token) = if is_native(&symbol, &asset.token) {
                (Namespace::Token, Namespace::TokenLocked, "")
            } else {
                (Namespace::Allowed, Namespace::AllowedLocked, asset.token.as_str())
            };
            balances.transfer(
                locked,
                Holder::from(&swap.owner),
                free,
                Holder::from(&swap.owner),
                token,
                &asset.amount,
            )?;
        }
    }
    remove(ctx, kind, id)?;
    info!(%id, "swap cancelled");
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-asset handlers
// ---------------------------------------------------------------------------

/// Locks `amount` of `token` for a swap to channel `to`; returns the swap id.
pub fn swap_begin<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    token: String,
    to: String,
    amount: BigInt,
    hash: String,
) -> LedgerResult<String> {
    begin(ctx, SwapKind::Single, to, vec![TransferItem { token, amount }], hash).map(|s| s.id)
}

pub fn swap_get<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<Swap> {
    load_existing(ctx, SwapKind::Single, &id)
}

pub fn swap_create_target<C>(_: &C, ctx: &mut TxContext<'_>, swap: Json<Swap>) -> LedgerResult<()> {
    if swap.0.assets.len() != 1 {
        return Err(LedgerError::domain("a single swap carries exactly one asset"));
    }
    create_target(ctx, SwapKind::Single, swap.0)
}

pub fn swap_done<C>(_: &C, ctx: &mut TxContext<'_>, id: String, key: String) -> LedgerResult<()> {
    done(ctx, SwapKind::Single, &id, &key)
}

pub fn swap_confirm<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    key: String,
) -> LedgerResult<()> {
    confirm(ctx, SwapKind::Single, &id, &key)
}

pub fn swap_cancel<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    cancel(ctx, SwapKind::Single, &id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::token::handlers::{allowed_balance_of, balance_of, given_balance, locked_balance_of};
    use crate::types::AccountRef;

    struct Token;

    fn n(v: u64) -> BigInt {
        BigInt::from(v)
    }

    fn owner() -> Address {
        Address::from_public_key(b"owner")
    }

    fn signed() -> Option<AccountRef> {
        Some(AccountRef::resolved(owner(), "o"))
    }

    fn hash_of(key: &str) -> String {
        hex::encode(sha3_256(key.as_bytes()))
    }

    fn funded() -> Fixture {
        let mut fx = Fixture::new();
        fx.run(None, |ctx| {
            ctx.balances("seed")
                .unwrap()
                .add(Namespace::Token, Holder::from(&owner()), "", &n(100))
                .unwrap()
        });
        fx
    }

    #[test]
    fn begin_locks_and_confirm_burns() {
        let mut fx = funded();
        let id = fx.run(signed(), |ctx| {
            swap_begin(&Token, ctx, "FIAT".into(), "cc".into(), n(40), hash_of("secret")).unwrap()
        });
        fx.run(None, |ctx| {
            assert_eq!(balance_of(&Token, ctx, owner()).unwrap(), n(60));
            assert_eq!(locked_balance_of(&Token, ctx, owner()).unwrap(), n(40));
            let swap = swap_get(&Token, ctx, id.clone()).unwrap();
            assert_eq!(swap.leg, Leg::Source);
            assert!(swap.opens_with("secret"));

            assert!(swap_confirm(&Token, ctx, id.clone(), "wrong".into()).is_err());
            swap_confirm(&Token, ctx, id.clone(), "secret".into()).unwrap();
            swap_confirm(&Token, ctx, id.clone(), "secret".into()).unwrap();
            assert_eq!(locked_balance_of(&Token, ctx, owner()).unwrap(), n(0));
            assert_eq!(given_balance(&Token, ctx, "cc".into()).unwrap(), n(40));
            assert!(swap_get(&Token, ctx, id.clone()).is_err());
        });
    }

    #[test]
    fn target_is_credited_with_the_key() {
        let mut fx = Fixture::new();
        let incoming = Swap {
            id: "s1".into(),
            owner: owner(),
            assets: vec![TransferItem {
                token: "CC".into(),
                amount: n(7),
            }],
            from: "cc".into(),
            to: "ch".into(),
            hash: hash_of("k"),
            timeout: fx.world.now().timestamp() + 60,
            leg: Leg::Source,
        };
        fx.run(None, |ctx| {
            swap_create_target(&Token, ctx, Json(incoming.clone())).unwrap();
            swap_create_target(&Token, ctx, Json(incoming.clone())).unwrap();
            assert_eq!(swap_get(&Token, ctx, "s1".into()).unwrap().leg, Leg::Target);
            assert!(swap_done(&Token, ctx, "s1".into(), "nope".into()).is_err());
            swap_done(&Token, ctx, "s1".into(), "k".into()).unwrap();
            assert_eq!(allowed_balance_of(&Token, ctx, owner(), "CC".into()).unwrap(), n(7));
            assert!(swap_done(&Token, ctx, "s1".into(), "k".into()).is_err());
        });
    }

    #[test]
    fn cancel_waits_for_expiry_and_owner() {
        let mut fx = funded();
        let id = fx.run(signed(), |ctx| {
            swap_begin(&Token, ctx, "FIAT".into(), "cc".into(), n(40), hash_of("s")).unwrap()
        });
        let early = fx.run(signed(), |ctx| swap_cancel(&Token, ctx, id.clone()));
        assert!(early.is_err());

        // Expired, but still inside the grace period.
        fx.world.advance(chrono::Duration::hours(3) + chrono::Duration::minutes(10));
        let grace = fx.run(signed(), |ctx| swap_cancel(&Token, ctx, id.clone()));
        assert!(grace.is_err());

        fx.world.advance(chrono::Duration::hours(1));
        let stranger = Some(AccountRef::unresolved(Address::from_public_key(b"x")));
        let result = fx.run(stranger, |ctx| swap_cancel(&Token, ctx, id.clone()));
        assert!(matches!(result, Err(LedgerError::Unauthorized)));

        fx.run(signed(), |ctx| {
            swap_cancel(&Token, ctx, id.clone()).unwrap();
            assert_eq!(balance_of(&Token, ctx, owner()).unwrap(), n(100));
            assert_eq!(locked_balance_of(&Token, ctx, owner()).unwrap(), n(0));
        });
    }

    #[test]
    fn expired_target_refuses_the_key() {
        let mut fx = Fixture::new();
        let incoming = Swap {
            id: "s2".into(),
            owner: owner(),
            assets: vec![TransferItem {
                token: "CC".into(),
                amount: n(7),
            }],
            from: "cc".into(),
            to: "ch".into(),
            hash: hash_of("k"),
            timeout: fx.world.now().timestamp() + 60,
            leg: Leg::Source,
        };
        fx.run(None, |ctx| swap_create_target(&Token, ctx, Json(incoming)).unwrap());
        fx.world.advance(chrono::Duration::seconds(60));
        fx.run(None, |ctx| {
            let err = swap_done(&Token, ctx, "s2".into(), "k".into()).unwrap_err();
            assert_eq!(err.to_string(), "swap s2 has expired");
            assert_eq!(allowed_balance_of(&Token, ctx, owner(), "CC".into()).unwrap(), n(0));
            assert_eq!(swap_get(&Token, ctx, "s2".into()).unwrap().leg, Leg::Target);
        });
    }

    #[test]
    fn bad_hash_and_foreign_token_are_rejected() {
        let mut fx = funded();
        fx.run(signed(), |ctx| {
            let bad_hash = swap_begin(&Token, ctx, "FIAT".into(), "cc".into(), n(1), "zz".into());
            assert!(bad_hash.is_err());
            let foreign = swap_begin(&Token, ctx, "USD".into(), "cc".into(), n(1), hash_of("s"));
            assert!(foreign.is_err());
            let same_channel =
                swap_begin(&Token, ctx, "FIAT".into(), "ch".into(), n(1), hash_of("s"));
            assert!(same_channel.is_err());
        });
    }
}
