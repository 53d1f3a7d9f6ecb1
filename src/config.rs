use std::net::SocketAddr;
use std::path::PathBuf;

use crate::raft::NodeId;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub listen_addr: SocketAddr,
    pub peers: Vec<PeerConfig>,
    /// Election timeout window. Randomized per reset; keep the lower bound
    /// well above `heartbeat_interval_ms`.
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Cap on entries per AppendEntries when backfilling a lagging peer.
    pub max_append_entries: usize,
    /// Where to keep the durable term/vote files. `None` keeps them in
    /// memory, which forfeits crash recovery.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub id: NodeId,
    /// host:port, IP or hostname.
    pub addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from("node-1"),
            listen_addr: "127.0.0.1:7400".parse().expect("static default addr"),
            peers: Vec::new(),
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            max_append_entries: 64,
            data_dir: None,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: impl Into<NodeId>, listen_addr: SocketAddr) -> Self {
        Self {
            node_id: node_id.into(),
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, id: impl Into<NodeId>, addr: impl Into<String>) -> Self {
        self.peers.push(PeerConfig {
            id: id.into(),
            addr: addr.into(),
        });
        self
    }

    /// Ids of every other cluster member.
    pub fn peer_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.iter().map(|p| p.id.clone())
    }
}
