use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{load, normalize_items, remove, save, Phase, Side, Transfer, TransferItem};
use crate::balance::{Holder, Namespace};
use crate::config::{DEFAULT_PAGE_SIZE, KEY_CC_TRANSFER_FROM};
use crate::context::TxContext;
use crate::error::{LedgerError, LedgerResult};
use crate::router::{AuthPolicy, Json, RouterBuilder};
use crate::stub::composite::range_by_partial_key_paginated;
use crate::types::proto::{self, CcTransferRecord};
use crate::types::{Address, BigInt};

/// Registers the cross-channel transfer operations.
pub fn routes<C: 'static>(builder: RouterBuilder<C>) -> RouterBuilder<C> {
    builder
        .invoke_tx("channelTransferByCustomer", AuthPolicy::Signed, by_customer::<C>)
        .invoke_tx("channelTransferByAdmin", AuthPolicy::Admin, by_admin::<C>)
        .invoke_tx("channelMultiTransferByCustomer", AuthPolicy::Signed, multi_by_customer::<C>)
        .invoke_tx("channelMultiTransferByAdmin", AuthPolicy::Admin, multi_by_admin::<C>)
        .invoke("createCCTransferTo", AuthPolicy::None, create_to::<C>)
        .invoke("commitCCTransferFrom", AuthPolicy::None, commit_from::<C>)
        .invoke("cancelCCTransferFrom", AuthPolicy::None, cancel_from::<C>)
        .invoke("deleteCCTransferFrom", AuthPolicy::None, delete_from::<C>)
        .invoke("removeCCTransferTo", AuthPolicy::None, remove_to::<C>)
        .query("channelTransferFrom", transfer_from::<C>)
        .query("channelTransfersFrom", transfers_from::<C>)
        .query("channelTransferTo", transfer_to::<C>)
}

// ---------------------------------------------------------------------------
// Balance movements
// ---------------------------------------------------------------------------

fn is_native(symbol: &str, token: &str) -> bool {
    token.eq_ignore_ascii_case(symbol)
}

fn not_found(id: &str) -> LedgerError {
    LedgerError::domain(format!("transfer {} not found", id))
}

/// Source side: takes the items from `owner`.
fn debit_source(
    ctx: &mut TxContext<'_>,
    owner: &Address,
    to: &str,
    items: &[TransferItem],
) -> LedgerResult<()> {
    let symbol = ctx.symbol()?;
    let mut balances = ctx.balances("channelTransfer")?;
    for item in items {
        if is_native(&symbol, &item.token) {
            balances.sub(Namespace::Token, Holder::from(owner), "", &item.amount)?;
            balances.add(Namespace::Given, Holder::Channel(to), "", &item.amount)?;
        } else {
            balances.sub(Namespace::Allowed, Holder::from(owner), &item.token, &item.amount)?;
        }
    }
    Ok(())
}

/// Source side: gives the items back to `owner` on cancellation.
fn restore_source(
    ctx: &mut TxContext<'_>,
    owner: &Address,
    to: &str,
    items: &[TransferItem],
) -> LedgerResult<()> {
    let symbol = ctx.symbol()?;
    let mut balances = ctx.balances("cancelChannelTransfer")?;
    for item in items {
        if is_native(&symbol, &item.token) {
            balances.sub(Namespace::Given, Holder::Channel(to), "", &item.amount)?;
            balances.add(Namespace::Token, Holder::from(owner), "", &item.amount)?;
        } else {
            balances.add(Namespace::Allowed, Holder::from(owner), &item.token, &item.amount)?;
        }
    }
    Ok(())
}

/// Destination side: credits the beneficiary. A token coming home pays
/// down what this channel gave to the source.
fn credit_destination(ctx: &mut TxContext<'_>, transfer: &Transfer) -> LedgerResult<()> {
    let symbol = ctx.symbol()?;
    let mut balances = ctx.balances("createCCTransferTo")?;
    let beneficiary = Holder::from(&transfer.beneficiary);
    for item in &transfer.items {
        if is_native(&symbol, &item.token) {
            balances.sub(Namespace::Given, Holder::Channel(&transfer.from), "", &item.amount)?;
            balances.add(Namespace::Token, beneficiary, "", &item.amount)?;
        } else {
            balances.add(Namespace::Allowed, beneficiary, &item.token, &item.amount)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

fn start(
    ctx: &mut TxContext<'_>,
    id: String,
    to: String,
    owner: Address,
    items: Vec<TransferItem>,
    is_multi: bool,
) -> LedgerResult<()> {
    if id.is_empty() {
        return Err(LedgerError::domain("empty transfer id"));
    }
    let from = ctx.channel_id().to_string();
    if to.eq_ignore_ascii_case(&from) {
        return Err(LedgerError::domain("impossible to transfer to the same channel"));
    }
    if !ctx.settings().accepts_channel(&to) {
        return Err(LedgerError::domain(format!("channel {} is not a transfer peer", to)));
    }
    let items = normalize_items(items)?;
    let symbol = ctx.symbol()?;
    if let Some(item) = items
        .iter()
        .find(|i| !is_native(&symbol, &i.token) && !i.token.eq_ignore_ascii_case(&to))
    {
        return Err(LedgerError::domain(format!(
            "incorrect token {}: only {} or tokens of {} may go to {}",
            item.token, symbol, to, to
        )));
    }
    if load(ctx.stub(), Side::From, &id)?.is_some() {
        return Err(LedgerError::domain("transfer already exists"));
    }

    debit_source(ctx, &owner, &to, &items)?;
    let transfer = Transfer {
        id,
        from,
        to,
        initiator: ctx.sender_address()?,
        beneficiary: owner,
        items,
        phase: Phase::CreatedFrom,
        timestamp_ms: ctx.timestamp().timestamp_millis(),
        is_multi,
    };
    save(ctx.stub_mut(), Side::From, &transfer)?;
    info!(
        id = %transfer.id,
        to = %transfer.to,
        owner = %owner,
        tx_id = ctx.tx_id(),
        "channel transfer created"
    );
    Ok(())
}

pub fn by_customer<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    to: String,
    token: String,
    amount: BigInt,
) -> LedgerResult<()> {
    let owner = ctx.sender_address()?;
    start(ctx, id, to, owner, vec![TransferItem { token, amount }], false)
}

/// Moves `user`'s balance on the issuer's authority.
pub fn by_admin<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    to: String,
    user: Address,
    token: String,
    amount: BigInt,
) -> LedgerResult<()> {
    start(ctx, id, to, user, vec![TransferItem { token, amount }], false)
}

pub fn multi_by_customer<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    to: String,
    items: Json<Vec<TransferItem>>,
) -> LedgerResult<()> {
    let owner = ctx.sender_address()?;
    start(ctx, id, to, owner, items.0, true)
}

pub fn multi_by_admin<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    id: String,
    to: String,
    user: Address,
    items: Json<Vec<TransferItem>>,
) -> LedgerResult<()> {
    start(ctx, id, to, user, items.0, true)
}

pub fn commit_from<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    ctx.require_relay()?;
    let mut transfer =
        load(ctx.stub(), Side::From, &id)?.ok_or_else(|| not_found(&id))?;
    if transfer.phase == Phase::CommittedFrom {
        return Ok(());
    }
    transfer.phase = Phase::CommittedFrom;
    save(ctx.stub_mut(), Side::From, &transfer)?;
    debug!(%id, "channel transfer committed");
    Ok(())
}

pub fn cancel_from<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    ctx.require_relay()?;
    let Some(transfer) = load(ctx.stub(), Side::From, &id)? else {
        return Ok(());
    };
    if transfer.phase != Phase::CreatedFrom {
        return Err(LedgerError::domain("transfer already committed"));
    }
    restore_source(ctx, &transfer.beneficiary, &transfer.to, &transfer.items)?;
    remove(ctx.stub_mut(), Side::From, &id)?;
    info!(%id, "channel transfer cancelled");
    Ok(())
}

pub fn delete_from<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    ctx.require_relay()?;
    let Some(transfer) = load(ctx.stub(), Side::From, &id)? else {
        return Ok(());
    };
    if transfer.phase != Phase::CommittedFrom {
        return Err(LedgerError::domain("transfer is not committed"));
    }
    remove(ctx.stub_mut(), Side::From, &id)
}

// ---------------------------------------------------------------------------
// Destination side
// ---------------------------------------------------------------------------

/// Mirrors a source record here and credits its beneficiary.
pub fn create_to<C>(_: &C, ctx: &mut TxContext<'_>, transfer: Json<Transfer>) -> LedgerResult<()> {
    ctx.require_relay()?;
    let mut transfer = transfer.0;
    if !transfer.to.eq_ignore_ascii_case(ctx.channel_id()) {
        return Err(LedgerError::ChannelMismatch {
            expected: ctx.channel_id().to_string(),
            got: transfer.to,
        });
    }
    if !ctx.settings().accepts_channel(&transfer.from) {
        return Err(LedgerError::domain(format!(
            "channel {} is not a transfer peer",
            transfer.from
        )));
    }
    if load(ctx.stub(), Side::To, &transfer.id)?.is_some() {
        return Ok(());
    }
    transfer.items = normalize_items(transfer.items)?;
    credit_destination(ctx, &transfer)?;
    transfer.phase = Phase::CreatedTo;
    save(ctx.stub_mut(), Side::To, &transfer)?;
    info!(
        id = %transfer.id,
        from = %transfer.from,
        beneficiary = %transfer.beneficiary,
        "channel transfer received"
    );
    Ok(())
}

pub fn remove_to<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<()> {
    ctx.require_relay()?;
    if load(ctx.stub(), Side::To, &id)?.is_some() {
        remove(ctx.stub_mut(), Side::To, &id)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn transfer_from<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<Transfer> {
    load(ctx.stub(), Side::From, &id)?.ok_or_else(|| not_found(&id))
}

pub fn transfer_to<C>(_: &C, ctx: &mut TxContext<'_>, id: String) -> LedgerResult<Transfer> {
    load(ctx.stub(), Side::To, &id)?.ok_or_else(|| not_found(&id))
}

/// One page of source-side records, for relays resuming after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPage {
    pub items: Vec<Transfer>,
    pub bookmark: String,
}

pub fn transfers_from<C>(
    _: &C,
    ctx: &mut TxContext<'_>,
    page_size: u32,
    bookmark: String,
) -> LedgerResult<TransferPage> {
    let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
    let page = range_by_partial_key_paginated::<&str>(
        ctx.stub(),
        KEY_CC_TRANSFER_FROM,
        &[],
        page_size,
        &bookmark,
    )?;
    let items = page
        .items
        .into_iter()
        .map(|(_, bytes)| Transfer::from_record(proto::decode::<CcTransferRecord>(&bytes)?))
        .collect::<LedgerResult<Vec<_>>>()?;
    Ok(TransferPage {
        items,
        bookmark: page.bookmark,
    })
}
