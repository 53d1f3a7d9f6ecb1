use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::raft::cluster::ClusterView;
use crate::raft::log::RaftLog;
use crate::raft::types::{LogCoords, LogIndex, NodeId, Term};

/// The three roles a node can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for RaftRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// Role-specific state. Transitions replace the whole variant; nothing from
/// the previous role survives.
#[derive(Debug)]
pub enum NodeState {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

impl NodeState {
    pub fn role(&self) -> RaftRole {
        match self {
            NodeState::Follower(_) => RaftRole::Follower,
            NodeState::Candidate(_) => RaftRole::Candidate,
            NodeState::Leader(_) => RaftRole::Leader,
        }
    }
}

/// A follower remembers which node it last accepted leader traffic from.
#[derive(Debug, Default)]
pub struct FollowerState {
    pub leader: Option<NodeId>,
}

/// Vote tally for one election. The candidate's own vote is implicit and
/// counted on top of `votes_for`; peers land in exactly one of the two sets,
/// and only their first answer counts.
#[derive(Debug)]
pub struct CandidateState {
    pub election_term: Term,
    cluster_size: usize,
    votes_for: BTreeSet<NodeId>,
    votes_against: BTreeSet<NodeId>,
}

impl CandidateState {
    pub fn new(election_term: Term, cluster_size: usize) -> Self {
        Self {
            election_term,
            cluster_size,
            votes_for: BTreeSet::new(),
            votes_against: BTreeSet::new(),
        }
    }

    /// Record one peer's answer. Duplicate answers from the same peer are
    /// ignored, whatever they say.
    pub fn record_vote(&mut self, from: NodeId, granted: bool) {
        if self.votes_for.contains(&from) || self.votes_against.contains(&from) {
            return;
        }
        if granted {
            self.votes_for.insert(from);
        } else {
            self.votes_against.insert(from);
        }
    }

    /// Strict majority, self-vote included.
    pub fn has_quorum(&self) -> bool {
        self.votes_for.len() + 1 > self.cluster_size / 2
    }

    pub fn tally(&self) -> (usize, usize) {
        (self.votes_for.len() + 1, self.votes_against.len())
    }
}

/// The leader's view of one follower: the next index to send it and the
/// highest index known replicated on it. `match_index < next_index` always,
/// and `match_index` only grows while this leadership lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub next_index: LogIndex,
    pub match_index: LogIndex,
}

impl Peer {
    fn new(last_appended: LogIndex) -> Self {
        Self {
            next_index: last_appended + 1,
            match_index: 0,
        }
    }
}

/// Per-peer replication bookkeeping for a leadership term.
#[derive(Debug)]
pub struct LeaderState {
    peers: BTreeMap<NodeId, Peer>,
}

impl LeaderState {
    pub fn new(cluster: &ClusterView, last_appended: LogCoords) -> Self {
        let peers = cluster
            .peers()
            .iter()
            .map(|id| (id.clone(), Peer::new(last_appended.index)))
            .collect();
        Self { peers }
    }

    pub fn peer(&self, id: &NodeId) -> Option<&Peer> {
        self.peers.get(id)
    }

    /// A successful replication reply: `match_index` ratchets up and
    /// `next_index` follows it.
    pub fn record_success(&mut self, from: &NodeId, match_index: LogIndex) {
        if let Some(peer) = self.peers.get_mut(from) {
            peer.match_index = peer.match_index.max(match_index);
            peer.next_index = peer.next_index.max(peer.match_index + 1);
        }
    }

    /// A failed replication reply: walk `next_index` back toward 1, never
    /// past what the peer has already confirmed.
    pub fn record_failure(&mut self, from: &NodeId) {
        if let Some(peer) = self.peers.get_mut(from) {
            peer.next_index = (peer.next_index - 1).max(peer.match_index + 1).max(1);
        }
    }

    /// After a local append, assume the new tail is in flight to everyone.
    /// Replies correct the assumption either way.
    pub fn advance_next(&mut self, past_tail: LogIndex) {
        for peer in self.peers.values_mut() {
            peer.next_index = peer.next_index.max(past_tail);
        }
    }

    /// The highest index above the commit watermark that a strict majority
    /// (self included) holds and that belongs to the current term, if any.
    pub fn commit_candidate(
        &self,
        log: &RaftLog,
        current_term: Term,
        quorum: usize,
    ) -> Option<LogIndex> {
        let mut n = log.latest_appended().index;
        while n > log.latest_commit() {
            if log.term_for_index(n) == Some(current_term) {
                let replicas =
                    1 + self.peers.values().filter(|p| p.match_index >= n).count();
                if replicas >= quorum {
                    return Some(n);
                }
            }
            n -= 1;
        }
        None
    }
}
