use crate::raft::types::NodeId;

/// Static membership as seen from one node: every member except the node
/// itself, kept sorted so fan-out order is deterministic.
#[derive(Debug, Clone)]
pub struct ClusterView {
    peers: Vec<NodeId>,
}

impl ClusterView {
    pub fn new(self_id: &NodeId, members: impl IntoIterator<Item = NodeId>) -> Self {
        let mut peers: Vec<NodeId> = members.into_iter().filter(|m| m != self_id).collect();
        peers.sort();
        peers.dedup();
        Self { peers }
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Cluster size including self.
    pub fn size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Smallest strict majority of the cluster, counting self.
    pub fn quorum(&self) -> usize {
        self.size() / 2 + 1
    }
}
