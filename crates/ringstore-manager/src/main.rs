//! DHT manager binary
//!
//! Serves the peer registry on a UDP control socket.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use ringstore_manager::{Manager, ManagerConfig, Registry};
use ringstore_transfer::{TransportConfig, UdpTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dht-manager", version, about = "Ringstore DHT manager")]
struct Args {
    /// Control channel listen address (overrides RINGSTORE_MANAGER_ADDR)
    #[arg(long, short)]
    bind: Option<SocketAddr>,

    /// Seed for random peer selection
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = ManagerConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    tracing::info!("dht-manager v{} starting", env!("CARGO_PKG_VERSION"));

    let registry = match config.seed {
        Some(seed) => Registry::with_seed(seed),
        None => Registry::new(),
    };
    let transport = UdpTransport::bind(TransportConfig::bound_to(config.bind)).await?;
    let manager = Manager::new(registry, Arc::new(transport));

    tokio::select! {
        result = manager.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dht_manager={level},ringstore={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
