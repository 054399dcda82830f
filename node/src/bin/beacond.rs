//! `beacond`: runs one node of a drand-style randomness beacon. Wires
//! `beacon_core`'s round arithmetic and crypto, `beacon_store`'s
//! on-disk store, and `beacon_net`'s HTTP peer transport into a
//! `beacon_node::RoundDriver`, matching `dee`'s `main.rs` pattern of a
//! thin binary over library crates.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_net::http::{router, HttpPeerTransport};
use beacon_net::signer::PeerSigner;
use beacon_net::transport::PeerTransport;
use beacon_node::{DriverError, NodeConfig, RoundDriver};
use beacon_store::callback::CallbackStore;
use beacon_store::parity::ParityStore;
use beacon_store::BeaconStore;
use clap::Parser;

/// Bounded queue depth for the store's callback worker (spec.md §9).
const CALLBACK_QUEUE_CAPACITY: usize = 16;

#[derive(Parser)]
#[command(author, version, about = "drand-style randomness beacon node")]
struct Cli {
    /// Path to the node's YAML configuration file.
    #[arg(long, short = 'c')]
    config: std::path::PathBuf,

    /// Run catch-up before joining the tick loop. Overrides the config
    /// file's `catchup` field when set.
    #[arg(long)]
    catchup: Option<bool>,

    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = NodeConfig::load(&cli.config).context("loading node config")?;
    let catchup = cli.catchup.unwrap_or(config.catchup);

    let group = config.load_group().context("loading group descriptor")?;
    let share = config.load_share().context("loading secret share")?;
    let seed = config.seed_bytes().context("decoding seed")?;

    std::fs::create_dir_all(&config.store_path).context("creating store directory")?;
    let backend = ParityStore::open(&config.store_path).context("opening beacon store")?;
    let store: Arc<dyn BeaconStore> = Arc::new(CallbackStore::new(
        backend,
        CALLBACK_QUEUE_CAPACITY,
        |beacon| {
            log::info!(
                "round {} committed: randomness={}",
                beacon.round,
                hex::encode(&beacon.randomness)
            );
        },
    ));

    let signer = Arc::new(PeerSigner::new(
        Arc::clone(&store),
        share.clone(),
        group.clone(),
    ));
    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("binding peer RPC listener on {}", config.listen_address))?;
    log::info!("peer RPC listening on {}", config.listen_address);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(signer)).await {
            log::error!("peer RPC server stopped: {e}");
        }
    });

    let transport: Arc<dyn PeerTransport> = Arc::new(HttpPeerTransport::new(config.dial_timeout()));
    let store_handle = Arc::clone(&store);
    let driver = Arc::new(RoundDriver::new(
        group,
        share.index,
        share.secret,
        store,
        transport,
        seed,
        config.dial_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let driver_handle = tokio::spawn(driver.run(catchup, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    log::info!("shutdown requested, draining in-flight round");
    let _ = shutdown_tx.send(true);

    match driver_handle.await.context("driver task panicked")? {
        Ok(()) => {}
        Err(DriverError::Store(e)) => return Err(e).context("beacon store failure"),
        Err(DriverError::Config(e)) => return Err(anyhow::anyhow!(e)).context("invalid configuration"),
    }

    store_handle.close().context("closing beacon store")?;
    server.abort();
    Ok(())
}
