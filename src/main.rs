use chordkv::{
    chord::{DEFAULT_RECV_TIMEOUT, DEFAULT_RING_BITS},
    network::{client::DhtClient, node::ChordPeer, PeerConfig},
};
use clap::{Args, Parser, Subcommand};
use log::{error, info, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "chordkv")]
#[command(about = "A Chord DHT node over UDP")]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RingArgs {
    /// Ring bit-width m; every node of a ring must agree
    #[arg(long = "bits", default_value_t = DEFAULT_RING_BITS)]
    bits: u8,
    /// Receive timeout in milliseconds; also the stabilization period
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_RECV_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new ring as its first node
    #[command(name = "start-bootstrap")]
    StartBootstrap {
        /// UDP port to listen on
        #[arg(short = 'p', long = "port")]
        port: u16,
        /// Host to bind and advertise (IP address or hostname)
        #[arg(short = 'n', long = "host", default_value = "127.0.0.1")]
        host: String,
        #[command(flatten)]
        ring: RingArgs,
    },
    /// Join an existing ring through a bootstrap node
    #[command(name = "join")]
    Join {
        /// UDP port to listen on
        #[arg(short = 'p', long = "port")]
        port: u16,
        /// Port of the bootstrap node to connect to
        #[arg(short = 'b', long = "bootstrap-port")]
        bootstrap_port: u16,
        /// Host for both this node and the bootstrap node (IP address or hostname)
        #[arg(short = 'n', long = "host", default_value = "127.0.0.1")]
        host: String,
        /// Give up joining after this many seconds (retries forever if unset)
        #[arg(long = "join-timeout-secs")]
        join_timeout_secs: Option<u64>,
        #[command(flatten)]
        ring: RingArgs,
    },
    /// Store a value in the ring
    #[command(name = "put")]
    Put {
        /// Any ring member, e.g. 127.0.0.1:5000
        #[arg(short = 'c', long = "contact")]
        contact: SocketAddr,
        key: String,
        value: String,
    },
    /// Fetch a value from the ring
    #[command(name = "get")]
    Get {
        /// Any ring member, e.g. 127.0.0.1:5000
        #[arg(short = 'c', long = "contact")]
        contact: SocketAddr,
        key: String,
    },
}

fn init_logging(level: LevelFilter) -> Result<(), String> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l}):5} {t} - {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| format!("Invalid logging config: {}", e))?;
    log4rs::init_config(config).map_err(|e| format!("Failed to install logger: {}", e))?;
    Ok(())
}

/// Resolves `host` (an IP literal or a hostname) to its first socket address.
async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("Cannot resolve {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| format!("No address found for {}:{}", host, port))
}

async fn serve(mut peer: ChordPeer, join_timeout: Option<Duration>) -> Result<(), String> {
    let shutdown = peer.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    let joined = match join_timeout {
        Some(limit) => tokio::time::timeout(limit, peer.join())
            .await
            .map_err(|_| format!("No JOIN_REP within {:?}", limit))?,
        None => peer.join().await,
    };
    joined.map_err(|e| format!("Failed to join ring: {}", e))?;

    info!("Node {} is running on {}", peer.node_id(), peer.local_addr());
    let actor = peer.run().await.map_err(|e| format!("Node error: {}", e))?;
    info!("Node shut down gracefully: {}", actor);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    match cli.command {
        Commands::StartBootstrap { port, host, ring } => {
            let config = PeerConfig::new(resolve_addr(&host, port).await?)
                .with_ring_bits(ring.bits)
                .with_recv_timeout(Duration::from_millis(ring.timeout_ms));
            let peer = ChordPeer::bind(config)
                .await
                .map_err(|e| format!("Failed to create peer: {}", e))?;

            info!("Other nodes can join using: chordkv join -b {} -p <PORT>", port);
            serve(peer, None).await
        }
        Commands::Join { port, bootstrap_port, host, join_timeout_secs, ring } => {
            let config = PeerConfig::new(resolve_addr(&host, port).await?)
                .with_bootstrap(resolve_addr(&host, bootstrap_port).await?)
                .with_ring_bits(ring.bits)
                .with_recv_timeout(Duration::from_millis(ring.timeout_ms));
            let peer = ChordPeer::bind(config)
                .await
                .map_err(|e| format!("Failed to create peer: {}", e))?;

            info!("Attempting to join ring through {}:{}", host, bootstrap_port);
            serve(peer, join_timeout_secs.map(Duration::from_secs)).await
        }
        Commands::Put { contact, key, value } => {
            let client = DhtClient::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
                .await
                .map_err(|e| format!("Failed to bind client: {}", e))?;
            match client.put(contact, &key, &value).await {
                Ok(()) => {
                    println!("OK");
                    Ok(())
                }
                Err(e) => {
                    error!("PUT {} failed: {}", key, e);
                    Err(e.to_string())
                }
            }
        }
        Commands::Get { contact, key } => {
            let client = DhtClient::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
                .await
                .map_err(|e| format!("Failed to bind client: {}", e))?;
            match client.get(contact, &key).await {
                Ok(Some(value)) => {
                    println!("{}", value);
                    Ok(())
                }
                Ok(None) => {
                    println!("(not found)");
                    Ok(())
                }
                Err(e) => {
                    error!("GET {} failed: {}", key, e);
                    Err(e.to_string())
                }
            }
        }
    }
}
