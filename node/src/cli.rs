//! # CLI Interface
//!
//! `clap` derive definition of the `ledger-node` binary: `serve`, `init`,
//! `keygen` and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use ledger_protocol::crypto::KeyType;

/// Development host for ledger contracts.
///
/// Runs one token chaincode on a local sled world state and serves it over
/// HTTP, standing in for a permissioned-ledger peer.
#[derive(Parser, Debug)]
#[command(
    name = "ledger-node",
    about = "Development host for ledger contracts",
    version,
    propagate_version = true
)]
pub struct LedgerNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the configured chaincode over HTTP.
    Serve(ServeArgs),
    /// Run the chaincode `init` entry point with the configured `[token]`.
    Init(InitArgs),
    /// Generate a keypair and print its public key, address and secret.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `server.listen`.
    #[arg(long, env = "LEDGER_LISTEN")]
    pub listen: Option<String>,

    /// Overrides `server.data_dir`.
    #[arg(long, short = 'd', env = "LEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides `server.log_format` (`pretty` or `json`).
    #[arg(long, env = "LEDGER_LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'c', env = "LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'd', env = "LEDGER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    #[arg(long, value_enum, default_value_t = KeyKind::Ed25519)]
    pub key_type: KeyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    Ed25519,
    Secp256k1,
}

impl From<KeyKind> for KeyType {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Ed25519 => KeyType::Ed25519,
            KeyKind::Secp256k1 => KeyType::Secp256k1,
        }
    }
}
