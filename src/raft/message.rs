use serde::{Deserialize, Serialize};

use crate::raft::types::{LogCoords, LogEntry, LogIndex, NodeId, Term};

/// Requests a node sends to its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Replicate entries (or assert leadership when `entries` is empty).
    AppendEntries {
        term: Term,
        /// Coordinates of the entry immediately before `entries`.
        prev: LogCoords,
        /// Leader's commit watermark at send time.
        commit_index: LogIndex,
        entries: Vec<LogEntry>,
    },
    /// Ask for a vote in `term`.
    RequestVote {
        term: Term,
        /// Coordinates of the candidate's last appended entry.
        last_log: LogCoords,
    },
}

impl Request {
    pub fn term(&self) -> Term {
        match self {
            Request::AppendEntries { term, .. } => *term,
            Request::RequestVote { term, .. } => *term,
        }
    }
}

/// Replies to [`Request`]s, delivered as addressed messages like any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    AppendEntries {
        term: Term,
        success: bool,
        /// Highest index appended by this exchange; 0 for a heartbeat or a
        /// rejection. The leader folds it into its `match_index` view.
        match_index: LogIndex,
    },
    RequestVote {
        term: Term,
        granted: bool,
    },
}

impl Response {
    pub fn term(&self) -> Term {
        match self {
            Response::AppendEntries { term, .. } => *term,
            Response::RequestVote { term, .. } => *term,
        }
    }
}

/// Anything a peer can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    Request(Request),
    Response(Response),
}

impl PeerMessage {
    pub fn term(&self) -> Term {
        match self {
            PeerMessage::Request(req) => req.term(),
            PeerMessage::Response(resp) => resp.term(),
        }
    }
}

/// The two logical timers a node owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutKind {
    /// No valid leader traffic within the election window.
    ReceiveHeartbeat,
    /// Time for the leader to assert itself again.
    SendHeartbeat,
}

/// One unit of work for the node state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A message delivered from a peer.
    Peer { from: NodeId, message: PeerMessage },
    /// One of the node's own timers fired.
    Timeout(TimeoutKind),
    /// A client write: payloads to replicate.
    Append(Vec<Vec<u8>>),
}

/// The complete result of processing one [`Input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Nothing to send; `reason` says why.
    NoOp { reason: String },
    /// Zero or more outgoing requests.
    Requests(Vec<(NodeId, Request)>),
    /// Exactly one reply to the sender of a request.
    Reply { to: NodeId, response: Response },
}

impl Output {
    pub fn no_op(reason: impl Into<String>) -> Self {
        Output::NoOp {
            reason: reason.into(),
        }
    }
}
