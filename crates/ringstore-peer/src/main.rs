//! DHT peer binary
//!
//! Registers with the manager, serves the ring protocol on the data socket
//! and reads commands from stdin.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ringstore_dht::PeerTuple;
use ringstore_peer::{Command, ControlClient, CsvDatasets, PeerConfig, PeerNode, USAGE};
use ringstore_protocols::FindOutcome;
use ringstore_transfer::{TransportConfig, UdpTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dht-peer", version, about = "Ringstore DHT peer")]
struct Args {
    /// Peer name, at most 15 characters (overrides RINGSTORE_PEER_NAME)
    #[arg(long, short)]
    name: Option<String>,

    /// Manager control address (overrides RINGSTORE_MANAGER_ADDR)
    #[arg(long, short)]
    manager: Option<SocketAddr>,

    /// Local control socket (overrides RINGSTORE_CONTROL_ADDR)
    #[arg(long)]
    control: Option<SocketAddr>,

    /// Local data socket (overrides RINGSTORE_DATA_ADDR)
    #[arg(long)]
    data: Option<SocketAddr>,

    /// Directory with details-<year>.csv files (overrides RINGSTORE_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seed for the lookup walk
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

    let mut config = PeerConfig::from_env()?;
    if let Some(name) = args.name {
        config.name = name;
    }
    if let Some(manager) = args.manager {
        config.manager = manager;
    }
    if let Some(control) = args.control {
        config.control = control;
    }
    if let Some(data) = args.data {
        config.data = data;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    tracing::info!("dht-peer v{} starting as {}", env!("CARGO_PKG_VERSION"), config.name);

    let advertise = config.advertise()?;
    let control = UdpTransport::bind(TransportConfig::bound_to(config.control)).await?;
    let data = UdpTransport::bind(TransportConfig::bound_to(config.data)).await?;
    let data_port = data.socket().local_addr()?.port();

    let client = ControlClient::new(Arc::new(control), config.manager)?;
    let me = PeerTuple::new(config.name.clone(), advertise, data_port);
    let datasets = Arc::new(CsvDatasets::new(config.data_dir.clone()));
    let node = Arc::new(match args.seed {
        Some(seed) => PeerNode::seeded(me, client, Arc::new(data), datasets, seed),
        None => PeerNode::new(me, client, Arc::new(data), datasets),
    });

    // Nothing else works until the manager knows us.
    node.register().await?;

    let runner = Arc::clone(&node);
    let listener = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = prompt(&node) => result?,
        result = listener => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
    }

    Ok(())
}

async fn prompt(node: &PeerNode) -> anyhow::Result<()> {
    println!("{}", USAGE);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };

        let result = match command {
            Command::SetupDht { size, dataset } => {
                node.setup_dht(size, &dataset).await.map(|counts| {
                    for count in counts {
                        println!("{}: {} records", count.name, count.records);
                    }
                })
            }
            Command::Query { key } => node.query(key).await.map(|outcome| match outcome {
                FindOutcome::Found { visited, record } => {
                    println!("found via {:?}", visited);
                    for (i, field) in record.fields().iter().enumerate() {
                        println!("  {:>2}: {}", i, field);
                    }
                }
                FindOutcome::NotFound { visited } => {
                    println!("Storm event {} not found in the DHT (visited {:?})", key, visited);
                }
            }),
            Command::Leave => node
                .leave()
                .await
                .map(|leader| println!("left the ring, leader is now {}", leader)),
            Command::Join => node
                .join()
                .await
                .map(|leader| println!("joined the ring led by {}", leader)),
            Command::Teardown => node.teardown().await.map(|()| println!("DHT torn down")),
            Command::Deregister => match node.deregister().await {
                Ok(()) => {
                    println!("deregistered");
                    return Ok(());
                }
                Err(e) => Err(e),
            },
            Command::Status => {
                println!("{}", node.status().await);
                Ok(())
            }
            Command::Help => {
                println!("{}", USAGE);
                Ok(())
            }
            Command::Quit => return Ok(()),
        };

        if let Err(e) = result {
            eprintln!("Error: {}", e);
        }
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
                .unwrap_or_else(|_| format!("dht_peer={level},ringstore={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
