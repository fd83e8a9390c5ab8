//! # Node Configuration
//!
//! The development node reads one TOML file:
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:7050"
//! data_dir = "./ledger-data"
//! log_format = "pretty"
//!
//! [chaincode]
//! channel = "fiat"
//! name = "fiat"
//! contract = "fiat"          # or "industrial"
//!
//! [settings]                 # ledger_protocol::CoreSettings
//! nonce_window = 50
//! conflict_policy = "last_write_wins"
//!
//! [token]                    # initial token config, used by `init`
//! symbol = "FIAT"
//! issuer = "<base58 address>"
//!
//! [acl]
//! auto_register = false
//!
//! [[acl.accounts]]
//! user_id = "issuer"
//! keys = ["<base58 public key>"]
//! ```
//!
//! Every section has defaults, so an empty file is a valid config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use ledger_contracts::industrial::{Group, IndustrialInit};
use ledger_protocol::acl::MemoryAcl;
use ledger_protocol::crypto::{KeyType, PublicKey};
use ledger_protocol::{CoreSettings, TokenConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub chaincode: ChaincodeConfig,
    pub settings: CoreSettings,
    pub token: Option<TokenConfig>,
    /// Initial groups of an industrial token.
    pub groups: Vec<Group>,
    pub acl: AclConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub data_dir: PathBuf,
    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7050".into(),
            data_dir: PathBuf::from("./ledger-data"),
            log_format: "pretty".into(),
        }
    }
}

/// Which contract the node hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    #[default]
    Fiat,
    Industrial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaincodeConfig {
    pub channel: String,
    pub name: String,
    pub contract: ContractKind,
}

impl Default for ChaincodeConfig {
    fn default() -> Self {
        Self {
            channel: "fiat".into(),
            name: "fiat".into(),
            contract: ContractKind::Fiat,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Accept unknown Ed25519/secp256k1 keys as single-key accounts.
    pub auto_register: bool,
    pub accounts: Vec<AclAccountConfig>,
}

/// One development key binding. Several keys make a multisig account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AclAccountConfig {
    pub user_id: String,
    pub keys: Vec<String>,
    #[serde(default = "default_key_type")]
    pub key_type: KeyType,
}

fn default_key_type() -> KeyType {
    KeyType::Ed25519
}

impl NodeConfig {
    /// Loads `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the development ACL from `[acl]`.
    pub fn build_acl(&self) -> Result<Arc<MemoryAcl>> {
        let acl = if self.acl.auto_register {
            MemoryAcl::new().with_auto_register()
        } else {
            MemoryAcl::new()
        };
        for account in &self.acl.accounts {
            let keys = account
                .keys
                .iter()
                .map(|text| PublicKey::from_base58(account.key_type, text))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("bad key for ACL user {}", account.user_id))?;
            anyhow::ensure!(!keys.is_empty(), "ACL user {} has no keys", account.user_id);
            acl.register(&account.user_id, keys);
        }
        Ok(Arc::new(acl))
    }

    /// The `init` argument for the configured contract, if `[token]` is set.
    pub fn init_argument(&self) -> Result<Option<Vec<u8>>> {
        let Some(token) = &self.token else {
            return Ok(None);
        };
        let bytes = match self.chaincode.contract {
            ContractKind::Fiat => serde_json::to_vec(token)?,
            ContractKind::Industrial => serde_json::to_vec(&IndustrialInit {
                token: token.clone(),
                groups: self.groups.clone(),
            })?,
        };
        Ok(Some(bytes))
    }
}
