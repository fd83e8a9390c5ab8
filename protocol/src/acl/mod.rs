//! # ACL Adapter
//!
//! The ACL is an external chaincode that knows which public keys belong to
//! which address, whether the account is black- or graylisted, and which
//! roles an address holds. The core never decides any of this itself.
//!
//! [`AclClient`] is the seam. [`ChaincodeAcl`] talks to the real ACL over a
//! cross-chaincode call; [`MemoryAcl`] keeps the registry in process and is
//! used by tests and the development node. Either way an unreachable or
//! failing ACL fails the invocation. There is no implicit allow.

pub mod chaincode;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::KeyType;
use crate::error::{LedgerError, LedgerResult};
use crate::stub::ChaincodeStub;
use crate::types::proto::{AccountInfoRecord, AclResponseRecord};
use crate::types::{AccountRef, Address};

pub use chaincode::ChaincodeAcl;
pub use memory::MemoryAcl;

/// Wire method: resolve a key set to an address.
pub const ACL_CHECK_KEYS: &str = "checkKeys";

/// Wire method: account status flags for an address.
pub const ACL_GET_ACCOUNT_INFO: &str = "getAccountInfo";

/// Wire method: whether an address holds a role for an operation.
pub const ACL_GET_OPERATION_RIGHT: &str = "getAccountOperationRight";

/// Separator between base58 keys in a `checkKeys` argument.
pub const KEY_LIST_SEPARATOR: &str = "/";

/// Account status flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub kyc_hash: String,
    pub gray_listed: bool,
    pub black_listed: bool,
    /// Empty when the ACL does not report one.
    pub user_id: String,
}

impl From<AccountInfoRecord> for AccountStatus {
    fn from(r: AccountInfoRecord) -> Self {
        Self {
            kyc_hash: r.kyc_hash,
            gray_listed: r.gray_listed,
            black_listed: r.black_listed,
            user_id: r.user_id,
        }
    }
}

impl From<&AccountStatus> for AccountInfoRecord {
    fn from(s: &AccountStatus) -> Self {
        Self {
            kyc_hash: s.kyc_hash.clone(),
            gray_listed: s.gray_listed,
            black_listed: s.black_listed,
            user_id: s.user_id.clone(),
        }
    }
}

/// What the ACL says about a presented key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclIdentity {
    pub address: Address,
    pub user_id: String,
    pub status: AccountStatus,
    /// Scheme of each presented key, in presentation order.
    pub key_types: Vec<KeyType>,
    pub is_multisig: bool,
    pub required_signatures: u32,
}

impl AclIdentity {
    /// The sender as seen by handlers.
    pub fn account_ref(&self) -> AccountRef {
        AccountRef::resolved(self.address, self.user_id.clone())
    }

    /// Rejects blacklisted accounts always, and graylisted ones when the
    /// caller is about to write.
    pub fn check_status(&self, writes: bool) -> LedgerResult<()> {
        if self.status.black_listed {
            return Err(LedgerError::Blacklisted(self.address.to_string()));
        }
        if writes && self.status.gray_listed {
            return Err(LedgerError::Graylisted(self.address.to_string()));
        }
        Ok(())
    }

    pub(crate) fn from_record(record: AclResponseRecord) -> LedgerResult<Self> {
        let address = record
            .address
            .ok_or_else(|| LedgerError::Malformed("ACL response without address".into()))?;
        let key_types = record
            .key_types
            .iter()
            .map(|t| KeyType::from_tag(*t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            address: Address::from_slice(&address.address)?,
            user_id: address.user_id,
            status: record.account.map(AccountStatus::from).unwrap_or_default(),
            key_types,
            is_multisig: address.is_multisig,
            required_signatures: address.required_signatures,
        })
    }

    pub(crate) fn to_record(&self) -> AclResponseRecord {
        use crate::types::proto::AclAddressRecord;
        AclResponseRecord {
            account: Some(AccountInfoRecord::from(&self.status)),
            address: Some(AclAddressRecord {
                user_id: self.user_id.clone(),
                address: self.address.as_bytes().to_vec(),
                is_multisig: self.is_multisig,
                required_signatures: self.required_signatures,
            }),
            key_types: self.key_types.iter().map(|t| t.tag()).collect(),
        }
    }
}

/// `getAccountOperationRight` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RightRequest {
    pub channel: String,
    pub chaincode: String,
    pub role: String,
    pub operation: String,
    pub address: Address,
}

impl RightRequest {
    pub(crate) fn to_args(&self) -> Vec<Vec<u8>> {
        vec![
            ACL_GET_OPERATION_RIGHT.as_bytes().to_vec(),
            self.channel.clone().into_bytes(),
            self.chaincode.clone().into_bytes(),
            self.role.clone().into_bytes(),
            self.operation.clone().into_bytes(),
            self.address.to_string().into_bytes(),
        ]
    }
}

/// Access to the ACL.
///
/// Every method receives the current stub because the production client
/// reaches the ACL through a cross-chaincode call.
pub trait AclClient: Send + Sync {
    /// Resolves base58 public keys, in presentation order, to an identity.
    fn check_keys(
        &self,
        stub: &mut dyn ChaincodeStub,
        keys: &[String],
    ) -> LedgerResult<AclIdentity>;

    fn account_info(
        &self,
        stub: &mut dyn ChaincodeStub,
        address: &Address,
    ) -> LedgerResult<AccountStatus>;

    fn has_right(&self, stub: &mut dyn ChaincodeStub, request: &RightRequest) -> LedgerResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(black: bool, gray: bool) -> AclIdentity {
        AclIdentity {
            address: Address::from_public_key(b"k"),
            user_id: "u".into(),
            status: AccountStatus {
                kyc_hash: String::new(),
                gray_listed: gray,
                black_listed: black,
                user_id: "u".into(),
            },
            key_types: vec![KeyType::Ed25519],
            is_multisig: false,
            required_signatures: 1,
        }
    }

    #[test]
    fn status_checks() {
        identity(false, false).check_status(true).unwrap();
        identity(false, true).check_status(false).unwrap();
        let graylisted = identity(false, true).check_status(true);
        assert!(matches!(graylisted, Err(LedgerError::Graylisted(_))));
        let blacklisted = identity(true, false).check_status(false);
        assert!(matches!(blacklisted, Err(LedgerError::Blacklisted(_))));
    }

    #[test]
    fn record_round_trip() {
        let id = identity(false, true);
        assert_eq!(AclIdentity::from_record(id.to_record()).unwrap(), id);
    }

    #[test]
    fn record_without_address_is_malformed() {
        assert!(AclIdentity::from_record(AclResponseRecord::default()).is_err());
    }
}
