//! # Protocol Configuration & Constants
//!
//! Every magic string and number the core relies on lives here: reserved
//! function names, composite-key object types, balance namespace tags,
//! nonce bounds and fee precision. These values are part of the persisted
//! state layout. Changing one after a deployment has written state under
//! it means a migration, so treat this file as append-only.
//!
//! [`CoreSettings`] is the runtime half: per-instance knobs supplied when a
//! [`Chaincode`](crate::pipeline::Chaincode) is constructed. Unlike the
//! token configuration it is never written to the ledger.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reserved function names
// ---------------------------------------------------------------------------

/// Host function that initialises the chaincode (persists the token config).
pub const FN_INIT: &str = "init";

/// Reflective query entry: `args[1]` names the query method.
pub const FN_QUERY: &str = "query";

/// Batch execution over previously queued preimages (ID list flavour).
pub const FN_BATCH_EXECUTE: &str = "batchExecute";

/// Batch execution over inline tasks.
pub const FN_EXECUTE_TASKS: &str = "executeTasks";

/// Names a contract may never register, because the pipeline owns them.
pub const RESERVED_FUNCTIONS: &[&str] = &[FN_INIT, FN_QUERY, FN_BATCH_EXECUTE, FN_EXECUTE_TASKS];

/// Event emitted once per batch invocation with the per-task outcomes.
pub const BATCH_EVENT_NAME: &str = "batchExecute";

// ---------------------------------------------------------------------------
// Composite key object types
// ---------------------------------------------------------------------------

/// Queued signed-transaction preimages.
pub const KEY_BATCH_TRANSACTIONS: &str = "batchTransactions";

/// Per-sender nonce window.
pub const KEY_NONCE: &str = "nonce";

/// Balance entries: `(balance, nsTag, address, token)`.
pub const KEY_BALANCE: &str = "balance";

/// Token configuration (plain key, not composite).
pub const KEY_TOKEN_METADATA: &str = "tokenMetadata";

/// Source-side cross-channel transfer records.
pub const KEY_CC_TRANSFER_FROM: &str = "ccTransferFrom";

/// Destination-side cross-channel transfer records.
pub const KEY_CC_TRANSFER_TO: &str = "ccTransferTo";

/// Single-asset swap records.
pub const KEY_SWAP: &str = "swap";

/// Multi-asset swap records.
pub const KEY_MULTI_SWAP: &str = "multiSwap";

/// Rate table entries are keyed `(rate, dealType, currency)` inside the token config.
pub const RATE_DEAL_CONVERT: &str = "convert";

// ---------------------------------------------------------------------------
// Nonce discipline
// ---------------------------------------------------------------------------

/// Number of recently accepted nonces kept per sender.
pub const NONCE_WINDOW: usize = 50;

/// Smallest acceptable nonce (inclusive). Millisecond timestamps have been
/// above this since 2004.
pub const NONCE_FLOOR: u64 = 1 << 40;

/// First rejected nonce (exclusive upper bound).
pub const NONCE_CEILING: u64 = 1 << 50;

// ---------------------------------------------------------------------------
// Fees & swaps
// ---------------------------------------------------------------------------

/// Fee and exchange rates are fixed-point with eight decimals.
pub const RATE_PRECISION: u64 = 100_000_000;

/// How long the key may be revealed on the target leg of a swap.
pub const DEFAULT_SWAP_TIMEOUT_SECS: i64 = 3 * 60 * 60;

/// Wait past a swap's expiry before the owner may cancel the source leg.
/// Must exceed the time a relay needs to confirm a redemption.
pub const DEFAULT_SWAP_CANCEL_GRACE_SECS: i64 = 30 * 60;

/// Name of the ACL chaincode queried for key bindings and rights.
pub const DEFAULT_ACL_CHAINCODE: &str = "acl";

/// Default page size for paginated ledger queries.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

/// How the batch executor treats two tasks in one batch writing the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchConflictPolicy {
    /// Later tasks see earlier writes and may overwrite them.
    #[default]
    LastWriteWins,
    /// A task whose write set intersects an earlier task's fails.
    RejectCollisions,
}

/// Per-instance settings. All fields have defaults so a partially written
/// TOML section deserialises cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Chaincode answering `checkKeys` and friends.
    pub acl_chaincode: String,
    /// Nonces retained per sender.
    pub nonce_window: usize,
    /// Batch write-set collision handling.
    pub conflict_policy: BatchConflictPolicy,
    /// Creator identities (hex of the creator bytes) allowed to drive the
    /// relay-only steps of cross-channel transfers and swaps. Empty means any.
    pub relay_creators: Vec<String>,
    /// Channels this instance accepts transfers to and from. Empty means any.
    pub peer_channels: Vec<String>,
    /// Seconds a swap stays redeemable on its target leg.
    pub swap_timeout_secs: i64,
    /// Seconds after expiry before the owner may cancel the source leg.
    pub swap_cancel_grace_secs: i64,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            acl_chaincode: DEFAULT_ACL_CHAINCODE.to_string(),
            nonce_window: NONCE_WINDOW,
            conflict_policy: BatchConflictPolicy::default(),
            relay_creators: Vec::new(),
            peer_channels: Vec::new(),
            swap_timeout_secs: DEFAULT_SWAP_TIMEOUT_SECS,
            swap_cancel_grace_secs: DEFAULT_SWAP_CANCEL_GRACE_SECS,
        }
    }
}

impl CoreSettings {
    /// Returns `true` if `creator` may run relay-only steps.
    pub fn is_relay(&self, creator: &[u8]) -> bool {
        self.relay_creators.is_empty()
            || self
                .relay_creators
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&hex::encode(creator)))
    }

    /// Earliest time, unix seconds, the source leg of a swap expiring at
    /// `timeout` may be cancelled.
    pub fn swap_cancellable_at(&self, timeout: i64) -> i64 {
        timeout.saturating_add(self.swap_cancel_grace_secs.max(0))
    }

    /// Returns `true` if transfers with `channel` are allowed.
    pub fn accepts_channel(&self, channel: &str) -> bool {
        self.peer_channels.is_empty() || self.peer_channels.iter().any(|c| c == channel)
    }
}
