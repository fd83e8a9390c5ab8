// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ledger Development Node
//!
//! Entry point for the `ledger-node` binary. Hosts one token chaincode on a
//! sled-backed world state and serves it over HTTP, so contracts can be
//! exercised end to end without a ledger network.
//!
//! Subcommands:
//!
//! - `serve`   start the HTTP host
//! - `init`    run the chaincode `init` with the configured token
//! - `keygen`  generate a signing keypair
//! - `version` print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod world;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use ledger_contracts::{FiatToken, IndustrialToken};
use ledger_protocol::crypto::{KeyType, Keypair};
use ledger_protocol::{Chaincode, ChaincodeInterface};

use cli::{Commands, LedgerNodeCli};
use config::{ContractKind, NodeConfig};
use logging::LogFormat;
use metrics::NodeMetrics;
use world::{Entry, SledWorld};

const DEFAULT_LOG_FILTER: &str = "ledger_node=info,ledger_protocol=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LedgerNodeCli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Init(args) => init_chaincode(args),
        Commands::Keygen(args) => keygen(args.key_type.into()),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads the config and applies command-line overrides.
fn load_config(path: Option<&Path>, data_dir: Option<std::path::PathBuf>) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(path)?;
    if let Some(dir) = data_dir {
        config.server.data_dir = dir;
    }
    Ok(config)
}

fn open_world(config: &NodeConfig) -> Result<SledWorld> {
    let path = &config.server.data_dir;
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create data directory: {}", path.display()))?;
    SledWorld::open(path, &config.chaincode.channel, &config.chaincode.name)
        .with_context(|| format!("failed to open world state at {}", path.display()))
}

/// The configured contract behind the protocol pipeline.
fn build_chaincode(config: &NodeConfig) -> Result<Arc<dyn ChaincodeInterface>> {
    let acl = config.build_acl()?;
    let settings = config.settings.clone();
    let chaincode: Arc<dyn ChaincodeInterface> = match config.chaincode.contract {
        ContractKind::Fiat => Arc::new(
            Chaincode::new(FiatToken, settings)
                .context("invalid core settings")?
                .with_acl(acl),
        ),
        ContractKind::Industrial => Arc::new(
            Chaincode::new(IndustrialToken, settings)
                .context("invalid core settings")?
                .with_acl(acl),
        ),
    };
    Ok(chaincode)
}

async fn serve(args: cli::ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref(), args.data_dir)?;
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(format) = args.log_format {
        config.server.log_format = format;
    }
    logging::init_logging(DEFAULT_LOG_FILTER, LogFormat::from_str_lossy(&config.server.log_format));

    tracing::info!(
        listen = %config.server.listen,
        data_dir = %config.server.data_dir.display(),
        channel = %config.chaincode.channel,
        contract = ?config.chaincode.contract,
        "starting ledger-node"
    );

    let world = Arc::new(open_world(&config)?);
    let metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    metrics.last_sequence.set(world.sequence()? as i64);

    let state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), ledger_protocol::VERSION),
        world: Arc::clone(&world),
        chaincode: build_chaincode(&config)?,
        metrics,
    };
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.server.listen))?;
    tracing::info!("API server listening on {}", config.server.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    world.flush().context("failed to flush world state")?;
    tracing::info!("ledger-node stopped");
    Ok(())
}

fn init_chaincode(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("ledger_node=info", LogFormat::Pretty);

    let config = load_config(args.config.as_deref(), args.data_dir)?;
    let argument = config
        .init_argument()?
        .context("the config has no [token] section to initialise from")?;

    let world = open_world(&config)?;
    let chaincode = build_chaincode(&config)?;
    let args = vec![b"init".to_vec(), argument];
    let outcome = world.execute(chaincode.as_ref(), Entry::Init, b"deployer", args)?;
    anyhow::ensure!(
        outcome.response.is_ok(),
        "init failed: {}",
        outcome.response.message
    );
    world.flush()?;

    println!("Chaincode initialized.");
    println!("  Data directory : {}", config.server.data_dir.display());
    println!("  Channel        : {}", config.chaincode.channel);
    println!("  Transaction    : {}", outcome.tx_id);
    Ok(())
}

fn keygen(key_type: KeyType) -> Result<()> {
    let keypair = Keypair::generate(key_type).context("key generation failed")?;
    let public = keypair.public_key();
    println!("key type   : {}", key_type.as_str());
    println!("public key : {}", public.to_base58());
    println!("address    : {}", public.address());
    println!("secret     : {}", hex::encode(keypair.secret_bytes()));
    Ok(())
}

fn print_version() {
    println!("ledger-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", ledger_protocol::VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
