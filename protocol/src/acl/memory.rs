//! In-process ACL registry.
//!
//! Serves two roles. As an [`AclClient`] it answers lookups directly. As a
//! [`ChaincodeInterface`] it speaks the ACL wire protocol, so it can be
//! registered as the `acl` peer of a [`MemoryWorld`](crate::stub::MemoryWorld)
//! and exercised through [`ChaincodeAcl`](super::ChaincodeAcl).
//!
//! Multi-signature accounts are n-of-n. Rotating one component key keeps the
//! account's address, so balances survive the rotation while the accepted
//! signer set changes.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::info;

use super::{
    AccountStatus, AclClient, AclIdentity, RightRequest, ACL_CHECK_KEYS, ACL_GET_ACCOUNT_INFO,
    ACL_GET_OPERATION_RIGHT, KEY_LIST_SEPARATOR,
};
use crate::crypto::keys::{KeyType, PublicKey};
use crate::error::{LedgerError, LedgerResult};
use crate::stub::{arg_text, ChaincodeInterface, ChaincodeStub, Response};
use crate::types::proto::{self, AccountInfoRecord, HaveRightRecord};
use crate::types::Address;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclAccount {
    pub user_id: String,
    pub address: Address,
    pub keys: Vec<PublicKey>,
    pub status: AccountStatus,
}

impl AclAccount {
    pub fn is_multisig(&self) -> bool {
        self.keys.len() > 1
    }
}

#[derive(Default)]
struct Registry {
    accounts: HashMap<Address, AclAccount>,
    by_key_set: HashMap<String, Address>,
    rights: HashSet<RightRequest>,
}

fn key_set_id<S: AsRef<str>>(keys: &[S]) -> String {
    let mut sorted: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.join(KEY_LIST_SEPARATOR)
}

fn guess_key_type(bytes: &[u8]) -> Option<KeyType> {
    match bytes.len() {
        32 => Some(KeyType::Ed25519),
        33 | 65 => Some(KeyType::Secp256k1),
        _ => None,
    }
}

#[derive(Default)]
pub struct MemoryAcl {
    registry: RwLock<Registry>,
    auto_register: bool,
}

impl MemoryAcl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers unknown Ed25519/secp256k1 key sets on first sight instead
    /// of rejecting them. For development hosts only.
    pub fn with_auto_register(mut self) -> Self {
        self.auto_register = true;
        self
    }

    /// Binds `keys` to a new account and returns its address: the key's own
    /// address for a single key, the multisig address otherwise.
    pub fn register(&self, user_id: &str, keys: Vec<PublicKey>) -> Address {
        let address = if keys.len() == 1 {
            keys[0].address()
        } else {
            let raw: Vec<&[u8]> = keys.iter().map(PublicKey::as_bytes).collect();
            Address::multisig(&raw)
        };
        let texts: Vec<String> = keys.iter().map(PublicKey::to_base58).collect();

        let mut registry = self.registry.write();
        registry.by_key_set.insert(key_set_id(&texts), address);
        registry.accounts.insert(
            address,
            AclAccount {
                user_id: user_id.to_string(),
                address,
                keys,
                status: AccountStatus::default(),
            },
        );
        info!(%address, user_id, "ACL account registered");
        address
    }

    /// Replaces one component key of an account. The address is kept.
    pub fn rotate_key(
        &self,
        address: &Address,
        old: &PublicKey,
        new: PublicKey,
    ) -> LedgerResult<()> {
        let mut registry = self.registry.write();
        let account = registry
            .accounts
            .get_mut(address)
            .ok_or_else(|| LedgerError::UnknownKey(address.to_string()))?;

        let old_texts: Vec<String> = account.keys.iter().map(PublicKey::to_base58).collect();
        let slot = account
            .keys
            .iter()
            .position(|k| k == old)
            .ok_or_else(|| LedgerError::UnknownKey(old.to_base58()))?;
        account.keys[slot] = new;
        let new_texts: Vec<String> = account.keys.iter().map(PublicKey::to_base58).collect();

        registry.by_key_set.remove(&key_set_id(&old_texts));
        registry.by_key_set.insert(key_set_id(&new_texts), *address);
        info!(%address, "ACL key rotated");
        Ok(())
    }

    fn update_status<F>(&self, address: &Address, f: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut AccountStatus),
    {
        let mut registry = self.registry.write();
        let account = registry
            .accounts
            .get_mut(address)
            .ok_or_else(|| LedgerError::UnknownKey(address.to_string()))?;
        f(&mut account.status);
        Ok(())
    }

    pub fn set_blacklisted(&self, address: &Address, on: bool) -> LedgerResult<()> {
        self.update_status(address, |s| s.black_listed = on)
    }

    pub fn set_graylisted(&self, address: &Address, on: bool) -> LedgerResult<()> {
        self.update_status(address, |s| s.gray_listed = on)
    }

    pub fn set_kyc_hash(&self, address: &Address, hash: &str) -> LedgerResult<()> {
        self.update_status(address, |s| s.kyc_hash = hash.to_string())
    }

    pub fn grant_right(&self, request: RightRequest) {
        self.registry.write().rights.insert(request);
    }

    pub fn revoke_right(&self, request: &RightRequest) {
        self.registry.write().rights.remove(request);
    }

    pub fn account(&self, address: &Address) -> Option<AclAccount> {
        self.registry.read().accounts.get(address).cloned()
    }

    fn auto_register_keys(&self, keys: &[String]) -> LedgerResult<Address> {
        let public_keys = keys
            .iter()
            .map(|text| {
                let raw = bs58::decode(text)
                    .into_vec()
                    .map_err(|_| LedgerError::UnknownKey(text.clone()))?;
                let key_type =
                    guess_key_type(&raw).ok_or_else(|| LedgerError::UnknownKey(text.clone()))?;
                Ok(PublicKey::new(key_type, raw))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        let provisional = if public_keys.len() == 1 {
            public_keys[0].address()
        } else {
            let raw: Vec<&[u8]> = public_keys.iter().map(PublicKey::as_bytes).collect();
            Address::multisig(&raw)
        };
        Ok(self.register(&provisional.to_string(), public_keys))
    }

    fn lookup(&self, keys: &[String]) -> LedgerResult<AclIdentity> {
        if keys.is_empty() {
            return Err(LedgerError::UnknownKey(String::new()));
        }
        let id = key_set_id(keys);
        let known = self.registry.read().by_key_set.get(&id).copied();
        let address = match known {
            Some(address) => address,
            None if self.auto_register => self.auto_register_keys(keys)?,
            None => return Err(LedgerError::UnknownKey(id)),
        };

        let registry = self.registry.read();
        let account = registry
            .accounts
            .get(&address)
            .ok_or_else(|| {
                LedgerError::Invariant(format!("key set {} bound to missing account", id))
            })?;
        let key_types = keys
            .iter()
            .map(|text| {
                account
                    .keys
                    .iter()
                    .find(|k| &k.to_base58() == text)
                    .map(PublicKey::key_type)
                    .ok_or_else(|| LedgerError::UnknownKey(text.clone()))
            })
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(AclIdentity {
            address: account.address,
            user_id: account.user_id.clone(),
            status: account.status.clone(),
            key_types,
            is_multisig: account.is_multisig(),
            required_signatures: account.keys.len() as u32,
        })
    }

    fn status_of(&self, address: &Address) -> LedgerResult<AccountStatus> {
        self.registry
            .read()
            .accounts
            .get(address)
            .map(|a| AccountStatus {
                user_id: a.user_id.clone(),
                ..a.status.clone()
            })
            .ok_or_else(|| LedgerError::UnknownKey(address.to_string()))
    }

    fn right_of(&self, request: &RightRequest) -> bool {
        self.registry.read().rights.contains(request)
    }

    fn serve(&self, args: &[Vec<u8>]) -> LedgerResult<Vec<u8>> {
        let function = arg_text(args, 0)?;
        match function {
            ACL_CHECK_KEYS => {
                let keys: Vec<String> = arg_text(args, 1)?
                    .split(KEY_LIST_SEPARATOR)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(proto::encode(&self.lookup(&keys)?.to_record()))
            }
            ACL_GET_ACCOUNT_INFO => {
                let address: Address = arg_text(args, 1)?.parse()?;
                Ok(proto::encode(&AccountInfoRecord::from(&self.status_of(&address)?)))
            }
            ACL_GET_OPERATION_RIGHT => {
                let request = RightRequest {
                    channel: arg_text(args, 1)?.to_string(),
                    chaincode: arg_text(args, 2)?.to_string(),
                    role: arg_text(args, 3)?.to_string(),
                    operation: arg_text(args, 4)?.to_string(),
                    address: arg_text(args, 5)?.parse()?,
                };
                Ok(proto::encode(&HaveRightRecord {
                    have_right: self.right_of(&request),
                }))
            }
            other => Err(LedgerError::UnknownMethod(other.to_string())),
        }
    }
}

impl AclClient for MemoryAcl {
    fn check_keys(
        &self,
        _stub: &mut dyn ChaincodeStub,
        keys: &[String],
    ) -> LedgerResult<AclIdentity> {
        self.lookup(keys)
    }

    fn account_info(
        &self,
        _stub: &mut dyn ChaincodeStub,
        address: &Address,
    ) -> LedgerResult<AccountStatus> {
        self.status_of(address)
    }

    fn has_right(
        &self,
        _stub: &mut dyn ChaincodeStub,
        request: &RightRequest,
    ) -> LedgerResult<bool> {
        Ok(self.right_of(request))
    }
}

impl ChaincodeInterface for MemoryAcl {
    fn init(&self, _stub: &mut dyn ChaincodeStub) -> Response {
        Response::ok(Vec::new())
    }

    fn invoke(&self, stub: &mut dyn ChaincodeStub) -> Response {
        self.serve(stub.args()).into()
    }
}
