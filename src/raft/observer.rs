use crate::raft::state::RaftRole;
use crate::raft::types::{LogCoords, NodeId, Term};

/// Hooks the node fires at well-defined points. All methods default to
/// no-ops; implement only what you need.
///
/// Callbacks run synchronously inside `on_message` and must not call back
/// into the node. Hand the event to a channel or queue if more work follows.
pub trait RaftObserver: Send {
    /// The node moved to a different role.
    fn on_role_change(&mut self, term: Term, old: RaftRole, new: RaftRole) {
        let _ = (term, old, new);
    }

    /// A leader was identified for the current term (possibly this node).
    fn on_new_leader(&mut self, leader: &NodeId) {
        let _ = leader;
    }

    /// An entry crossed the commit watermark. Fired in strict index order.
    fn on_commit(&mut self, coords: LogCoords, data: &[u8]) {
        let _ = (coords, data);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RaftObserver for NoopObserver {}
