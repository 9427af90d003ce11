//! `vrf`: run a VRF group member, or simulate a whole group in-process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use tracing::info;
use vrf_engine::audit::AuditTracker;
use vrf_engine::config::{ClientConfig, LogConfig, load_signing_key};
use vrf_engine::crypto::LocalKeypair;
use vrf_engine::ledger::{DkgContract, LedgerClient, PingContract, RestLedger};
use vrf_engine::logging::init_logging;
use vrf_engine::orchestrator::{LivenessPinger, LocalGroup, PingOutcome, ProtocolClient, request_randomness};
use vrf_engine::types::Binary;

#[derive(Parser)]
#[command(name = "vrf", version = "0.1", about = "Threshold VRF group member")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the round and ping loops until Ctrl-C
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Hex signing key file; defaults to $VRF_SIGNING_KEY
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
    /// Run a full group against the in-memory ledger
    Simulate {
        #[arg(short, long, default_value_t = 5)]
        members: u32,
        #[arg(short, long, default_value_t = 3)]
        threshold: u32,
        #[arg(short, long, default_value_t = 3)]
        rounds: u32,
        /// Base64 round input; the round number is appended per round
        #[arg(short, long, default_value = "aGVsbG8=")]
        input: String,
    },
    /// Ask the group for a new round of randomness
    RequestRandom {
        #[arg(short, long)]
        config: PathBuf,
        /// Base64 round input
        #[arg(short, long)]
        input: String,
    },
    /// Send one liveness ping if it is due
    Ping {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print a fresh secp256k1 signing key and its public key
    Keygen,
}

fn rest_ledger(config: &ClientConfig) -> Result<Arc<dyn LedgerClient>> {
    let ledger = RestLedger::new(&config.lcd_url, &config.broadcast_url, config.sender.clone())
        .context("building ledger client")?;
    Ok(Arc::new(ledger))
}

async fn run(config: PathBuf, key_file: Option<PathBuf>) -> Result<()> {
    let config = ClientConfig::load(&config)?;
    let _guard = init_logging(&config.log);
    let keypair = load_signing_key(key_file.as_deref())?;
    info!(sender = %config.sender, pubkey = %keypair.public_key_base64(), "starting member");

    let client = ProtocolClient::start(&config, keypair)?;
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("stopping, waiting for in-flight ticks");
    client.shutdown().await?;
    Ok(())
}

async fn simulate(members: u32, threshold: u32, rounds: u32, input: String) -> Result<()> {
    let _guard = init_logging(&LogConfig {
        filter: "warn".into(),
        ..LogConfig::default()
    });
    let input = STANDARD.decode(input).context("input is not base64")?;

    let mut group = LocalGroup::new(members, threshold)?;
    group.complete_dkg().await?;
    let group_key = group.ledger().group_public_key()?;
    println!("group public key: {}", STANDARD.encode(&group_key));

    for n in 1..=rounds {
        let mut round_input = input.clone();
        round_input.extend_from_slice(&n.to_be_bytes());
        let round = group.run_round(&round_input).await?;
        let randomness = round.randomness.map(|r| hex::encode(r.as_slice())).unwrap_or_default();
        println!("round {}: randomness {randomness} ({} shares)", round.round, round.sigs.len());
    }
    Ok(())
}

async fn request_random(config: PathBuf, input: String) -> Result<()> {
    let config = ClientConfig::load(&config)?;
    let _guard = init_logging(&config.log);
    let input = Binary::from_base64(&input)?;
    let contract = DkgContract::new(rest_ledger(&config)?, config.contract.clone(), config.fees.clone());
    let tx = request_randomness(&contract, &AuditTracker::default(), input).await?;
    println!("requested: tx {} at height {}", tx.tx_hash, tx.height);
    Ok(())
}

async fn ping(config: PathBuf) -> Result<()> {
    let config = ClientConfig::load(&config)?;
    let _guard = init_logging(&config.log);
    let contract = PingContract::new(rest_ledger(&config)?, config.ping_contract.clone(), config.fees.default.clone());
    let pinger = LivenessPinger::new(contract, Arc::new(AuditTracker::default()));
    match pinger.ping_once().await? {
        PingOutcome::Pinged(tx) => println!("pinged: tx {}", tx.tx_hash),
        PingOutcome::NotDue { remaining } => println!("not due for {remaining} blocks"),
    }
    Ok(())
}

fn keygen() {
    let keypair = LocalKeypair::generate();
    println!("private key: {}", keypair.to_hex().as_str());
    println!("public key:  {}", keypair.public_key_base64());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, key_file } => run(config, key_file).await,
        Commands::Simulate {
            members,
            threshold,
            rounds,
            input,
        } => simulate(members, threshold, rounds, input).await,
        Commands::RequestRandom { config, input } => request_random(config, input).await,
        Commands::Ping { config } => ping(config).await,
        Commands::Keygen => {
            keygen();
            Ok(())
        }
    }
}
