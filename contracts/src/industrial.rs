//! # Industrial Token Contract
//!
//! A token issued in groups. Each group is a batch of output with its own
//! emission, maturity date and free-text note; holdings of different
//! groups never mix. The group id is the token component of the balance
//! key, so `Token/<holder>/<group>` is the holder's share of that group.
//!
//! A group's whole emission is credited to the issuer when the group is
//! created; the issuer then distributes it with ordinary transfers.
//! Holders may redeem their share once the group has matured.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use ledger_protocol::balance::{Holder, Namespace};
use ledger_protocol::router::Json;
use ledger_protocol::{
    token, Address, AuthPolicy, BigInt, Contract, LedgerError, LedgerResult, RouterBuilder,
    TokenConfig, TxContext,
};

/// State key of the group registry.
pub const KEY_GROUPS: &str = "industrialGroups";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Industrial token failures. All of them are business-rule violations and
/// surface as domain errors.
#[derive(Debug, Error)]
pub enum IndustrialError {
    /// No group with this id.
    #[error("group {0} not found")]
    UnknownGroup(String),

    /// A group with this id already exists.
    #[error("group {0} already exists")]
    GroupExists(String),

    /// Group ids are non-empty and use `[A-Za-z0-9_]` only.
    #[error("invalid group id {0:?}")]
    InvalidGroupId(String),

    /// Redemption before the maturity date.
    #[error("group {group} matures at {maturity}")]
    NotMatured {
        group: String,
        maturity: DateTime<Utc>,
    },

    #[error("impossible to send to the same address")]
    SameAddress,
}

impl From<IndustrialError> for LedgerError {
    fn from(err: IndustrialError) -> Self {
        LedgerError::Domain(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One production batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    /// Units issued for this group.
    pub emission: BigInt,
    pub maturity: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
}

/// Argument of `init`: the token config plus the initial groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustrialInit {
    pub token: TokenConfig,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Answer of `industrialMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndustrialMetadata {
    pub token: TokenConfig,
    pub groups: Vec<Group>,
}

/// The industrial token contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct IndustrialToken;

impl Contract for IndustrialToken {
    fn routes(builder: RouterBuilder<Self>) -> RouterBuilder<Self> {
        builder
            .query("metadata", token::handlers::metadata::<Self>)
            .query("industrialMetadata", industrial_metadata)
            .query("industrialBalanceOf", industrial_balance_of)
            .query("groupBalanceOf", group_balance_of)
            .invoke_tx("addGroup", AuthPolicy::Admin, add_group)
            .invoke_tx("setGroupNote", AuthPolicy::Admin, set_group_note)
            .invoke_tx("transferIndustrial", AuthPolicy::Signed, transfer_industrial)
            .invoke_tx("redeemGroup", AuthPolicy::Signed, redeem_group)
    }

    fn init(&self, ctx: &mut TxContext<'_>, args: &[Vec<u8>]) -> LedgerResult<()> {
        let [raw] = args else {
            return Err(LedgerError::WrongArgumentCount {
                method: "init".into(),
                expected: 1,
                got: args.len(),
            });
        };
        let init: IndustrialInit = serde_json::from_slice(raw)?;
        init.token.initialize(ctx.stub_mut())?;
        save_groups(ctx, &BTreeMap::new())?;
        for group in init.groups {
            create_group(ctx, group)?;
        }
        info!(symbol = %init.token.symbol, "industrial token initialized");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Group registry
// ---------------------------------------------------------------------------

fn load_groups(ctx: &TxContext<'_>) -> LedgerResult<BTreeMap<String, Group>> {
    match ctx.stub().get_state(KEY_GROUPS)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(BTreeMap::new()),
    }
}

fn save_groups(ctx: &mut TxContext<'_>, groups: &BTreeMap<String, Group>) -> LedgerResult<()> {
    let bytes = serde_json::to_vec(groups).map_err(|e| LedgerError::Serialization(e.to_string()))?;
    ctx.stub_mut().put_state(KEY_GROUPS, bytes)
}

fn load_group(ctx: &TxContext<'_>, id: &str) -> LedgerResult<Group> {
    load_groups(ctx)?
        .remove(id)
        .ok_or_else(|| IndustrialError::UnknownGroup(id.to_string()).into())
}

fn valid_group_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn create_group(ctx: &mut TxContext<'_>, group: Group) -> LedgerResult<()> {
    if !valid_group_id(&group.id) {
        return Err(IndustrialError::InvalidGroupId(group.id).into());
    }
    if group.emission.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let mut groups = load_groups(ctx)?;
    if groups.contains_key(&group.id) {
        return Err(IndustrialError::GroupExists(group.id).into());
    }

    let issuer = ctx.token_config()?.issuer;
    ctx.balances("emit")?
        .add(Namespace::Token, Holder::from(&issuer), &group.id, &group.emission)?;
    let config = ctx.token_config_mut()?;
    config.total_emission = &config.total_emission + &group.emission;
    ctx.save_token_config()?;

    info!(
        group = %group.id,
        emission = %group.emission,
        maturity = %group.maturity,
        "group created"
    );
    groups.insert(group.id.clone(), group);
    save_groups(ctx, &groups)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub fn industrial_metadata(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
) -> LedgerResult<IndustrialMetadata> {
    let token = ctx.token_config()?.clone();
    let groups = load_groups(ctx)?.into_values().collect();
    Ok(IndustrialMetadata { token, groups })
}

/// Every non-empty group holding of `address`.
pub fn industrial_balance_of(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    address: Address,
) -> LedgerResult<BTreeMap<String, BigInt>> {
    let mut held = ctx.balances("query")?.aggregate(Namespace::Token, Holder::from(&address))?;
    held.retain(|group, amount| !group.is_empty() && !amount.is_zero());
    Ok(held)
}

pub fn group_balance_of(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    address: Address,
    group: String,
) -> LedgerResult<BigInt> {
    load_group(ctx, &group)?;
    ctx.balances("query")?.get(Namespace::Token, Holder::from(&address), &group)
}

// ---------------------------------------------------------------------------
// Issuer operations
// ---------------------------------------------------------------------------

pub fn add_group(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    group: Json<Group>,
) -> LedgerResult<()> {
    create_group(ctx, group.0)
}

pub fn set_group_note(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    group: String,
    note: String,
) -> LedgerResult<()> {
    let mut groups = load_groups(ctx)?;
    let entry = groups
        .get_mut(&group)
        .ok_or_else(|| IndustrialError::UnknownGroup(group.clone()))?;
    entry.note = note;
    save_groups(ctx, &groups)
}

// ---------------------------------------------------------------------------
// Holder operations
// ---------------------------------------------------------------------------

pub fn transfer_industrial(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    to: Address,
    group: String,
    amount: BigInt,
    reference: String,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let from = ctx.sender_address()?;
    if from == to {
        return Err(IndustrialError::SameAddress.into());
    }
    load_group(ctx, &group)?;
    ctx.balances("transfer")?.transfer(
        Namespace::Token,
        Holder::from(&from),
        Namespace::Token,
        Holder::from(&to),
        &group,
        &amount,
    )?;
    info!(%from, %to, %group, %amount, reference = %reference, "industrial transfer");
    Ok(())
}

/// Burns the sender's share of a matured group.
pub fn redeem_group(
    _: &IndustrialToken,
    ctx: &mut TxContext<'_>,
    group: String,
    amount: BigInt,
) -> LedgerResult<()> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let found = load_group(ctx, &group)?;
    if ctx.timestamp() < found.maturity {
        return Err(IndustrialError::NotMatured {
            group,
            maturity: found.maturity,
        }
        .into());
    }
    let holder = ctx.sender_address()?;
    ctx.balances("redeem")?
        .sub(Namespace::Token, Holder::from(&holder), &group, &amount)?;
    let config = ctx.token_config_mut()?;
    config.total_emission = config
        .total_emission
        .checked_sub(&amount)
        .map_err(|_| LedgerError::Invariant("redeem exceeds total emission".into()))?;
    ctx.save_token_config()?;
    info!(%holder, %group, %amount, "group redeemed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ids_are_restricted() {
        assert!(valid_group_id("LOT_2026_01"));
        assert!(!valid_group_id(""));
        assert!(!valid_group_id("a/b"));
        assert!(!valid_group_id("lot 1"));
    }

    #[test]
    fn errors_surface_as_domain_failures() {
        let err: LedgerError = IndustrialError::UnknownGroup("LOT1".into()).into();
        assert_eq!(err.to_string(), "group LOT1 not found");
        assert_eq!(err.kind(), ledger_protocol::ErrorKind::Domain);
    }

    #[test]
    fn group_json_is_camel_case() {
        let group: Group = serde_json::from_str(
            r#"{"id":"LOT1","emission":"1000","maturity":"2027-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(group.emission, BigInt::from(1000));
        assert!(group.note.is_empty());
    }
}
