//! hearsayd - demo gossip daemon
//!
//! Spawns a single peer, joins it to a cluster through the given seeds,
//! and dumps the membership view periodically.

use clap::Parser;
use hearsay::{Peer, PeerConfig, PeerInfo};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// hearsayd - push-gossip membership demo daemon
#[derive(Parser, Debug)]
#[command(name = "hearsayd")]
#[command(about = "Push-gossip membership daemon")]
struct Args {
    /// Listen address (port 0 picks a free port)
    #[arg(short, long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Advertised peer name
    #[arg(short, long, default_value = "", env = "HEARSAY_NAME")]
    name: String,

    /// Seed peers to join through (comma-separated addresses)
    #[arg(short, long, value_delimiter = ',')]
    seeds: Vec<String>,

    /// Gossip tick period in milliseconds
    #[arg(long, default_value = "1000")]
    ping_period_ms: u64,

    /// Membership dump period in seconds
    #[arg(long, default_value = "5")]
    dump_period_secs: u64,
}

impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if self.ping_period_ms == 0 {
            anyhow::bail!("ping period must be positive");
        }
        if self.dump_period_secs == 0 {
            anyhow::bail!("dump period must be positive");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("hearsay=info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(err) = args.validate() {
        error!("invalid arguments: {}", err);
        return ExitCode::FAILURE;
    }

    info!("hearsayd v{}", env!("CARGO_PKG_VERSION"));

    let config = PeerConfig::new(args.listen, Duration::from_millis(args.ping_period_ms));
    let peer = match Peer::spawn(config).await {
        Ok(peer) => peer,
        Err(err) => {
            error!("failed to spawn peer: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if !args.name.is_empty() {
        peer.update_self_info(PeerInfo::named(args.name));
    }
    for seed in args.seeds {
        peer.add_seed(seed);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.dump_period_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let members = peer.members();
                let stats = peer.stats();
                info!(
                    "{} sees {} members ({} records, {} connections)",
                    peer.addr(),
                    members.len(),
                    stats.records,
                    stats.connections
                );
                for (addr, info) in members {
                    info!("  {} {}", addr, info.name);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
                break;
            }
        }
    }

    peer.stop().await;
    ExitCode::SUCCESS
}
