use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quorum_lite::config::{NodeConfig, PeerConfig};
use quorum_lite::raft::NodeId;
use quorum_lite::runtime::NodeDriver;
use quorum_lite::transport::HttpOutbox;
use quorum_lite::{shutdown, transport};

#[derive(Parser, Debug)]
#[command(name = "quorum-lite")]
#[command(about = "A Raft consensus node speaking JSON over HTTP")]
struct Args {
    /// Unique identifier for this node
    #[arg(long, default_value = "node-1")]
    node_id: String,

    /// Port to listen on
    #[arg(long, default_value = "7400")]
    port: u16,

    /// Peer addresses (comma-separated, format: "id:host:port")
    /// Example: "node-2:127.0.0.1:7401,node-3:127.0.0.1:7402"
    #[arg(long, default_value = "")]
    peers: String,

    /// Directory for durable term/vote state; omitted means in-memory only
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn parse_peers(peers_str: &str) -> Vec<PeerConfig> {
    if peers_str.is_empty() {
        return Vec::new();
    }

    peers_str
        .split(',')
        .filter_map(|peer| {
            let parts: Vec<&str> = peer.trim().splitn(2, ':').collect();
            match parts.as_slice() {
                [id, addr] if addr.contains(':') => Some(PeerConfig {
                    id: NodeId::from(*id),
                    addr: addr.to_string(),
                }),
                _ => {
                    tracing::warn!(peer, "invalid peer format, expected id:host:port");
                    None
                }
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = NodeConfig {
        node_id: NodeId::from(args.node_id),
        listen_addr,
        peers: parse_peers(&args.peers),
        data_dir: args.data_dir,
        ..Default::default()
    };

    tracing::info!(
        node_id = %config.node_id,
        listen_addr = %config.listen_addr,
        peers = ?config.peers.iter().map(|p| format!("{}:{}", p.id, p.addr)).collect::<Vec<_>>(),
        "starting quorum-lite node"
    );

    let token = shutdown::install_shutdown_handler();
    let outbox = HttpOutbox::new(config.node_id.clone(), &config.peers);
    let (driver, handle) = NodeDriver::new(&config, Box::new(outbox))?;

    let driver_task = tokio::spawn(driver.run(token.clone()));
    transport::serve(config.listen_addr, handle, token.clone()).await?;
    driver_task.await?;

    tracing::info!("node stopped");
    Ok(())
}
