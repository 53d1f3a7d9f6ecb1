use std::collections::HashMap;

use crate::config::PeerConfig;
use crate::raft::{NodeId, PeerMessage};
use crate::runtime::Outbox;
use crate::transport::Envelope;

/// Posts envelopes to each peer's `/raft` inbox. Sends are spawned and
/// forgotten: an unreachable peer costs a debug line, and the protocol's
/// own retry paths make up the difference once the peer returns.
pub struct HttpOutbox {
    self_id: NodeId,
    peers: HashMap<NodeId, String>,
    client: reqwest::Client,
}

impl HttpOutbox {
    pub fn new(self_id: NodeId, peers: &[PeerConfig]) -> Self {
        let peers = peers
            .iter()
            .map(|p| (p.id.clone(), p.addr.clone()))
            .collect();
        Self {
            self_id,
            peers,
            client: reqwest::Client::new(),
        }
    }
}

impl Outbox for HttpOutbox {
    fn send(&mut self, to: &NodeId, message: PeerMessage) {
        let Some(addr) = self.peers.get(to) else {
            tracing::warn!(peer = %to, "dropping message for unknown peer");
            return;
        };
        let url = format!("http://{addr}/raft");
        let envelope = Envelope {
            from: self.self_id.clone(),
            message,
        };
        let client = self.client.clone();
        let peer = to.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&envelope).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(peer = %peer, status = %response.status(), "peer refused envelope");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(peer = %peer, %err, "peer unreachable");
                }
            }
        });
    }
}
