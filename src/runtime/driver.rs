use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{QuorumError, Result};
use crate::raft::{
    ClusterView, FileStateStore, Input, LogCoords, LogIndex, MemoryStateStore, NodeId, Output,
    PeerMessage, PersistentState, RaftNode, RaftObserver, RaftRole, StateStore, Term,
};
use crate::runtime::timers::TokioTimers;

/// Delivery of outgoing peer messages. Implementations enqueue and return;
/// delivery failures are their problem (the protocol repairs itself through
/// heartbeats and failure replies).
pub trait Outbox: Send {
    fn send(&mut self, to: &NodeId, message: PeerMessage);
}

/// An entry that crossed the commit watermark, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEntry {
    pub coords: LogCoords,
    pub data: Vec<u8>,
}

/// Snapshot of a node's externally visible state.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub role: String,
    pub current_term: Term,
    pub leader_id: Option<String>,
    pub commit_index: LogIndex,
    pub log_length: usize,
}

/// What the outside world may ask of a running node.
#[derive(Debug)]
pub enum DriverMessage {
    /// A peer message arrived over some transport.
    Deliver { from: NodeId, message: PeerMessage },
    /// A client write; replies with the coordinates of the appended tail.
    Append {
        data: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<LogCoords>>,
    },
    Status { reply: oneshot::Sender<NodeStatus> },
}

/// Cheap-to-clone handle for talking to a [`NodeDriver`].
#[derive(Clone)]
pub struct NodeHandle {
    command_tx: mpsc::Sender<DriverMessage>,
    commits: broadcast::Sender<CommittedEntry>,
}

impl NodeHandle {
    pub async fn deliver(&self, from: NodeId, message: PeerMessage) -> Result<()> {
        self.command_tx
            .send(DriverMessage::Deliver { from, message })
            .await
            .map_err(|_| QuorumError::NodeUnavailable)
    }

    pub async fn append(&self, data: Vec<Vec<u8>>) -> Result<LogCoords> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(DriverMessage::Append { data, reply })
            .await
            .map_err(|_| QuorumError::NodeUnavailable)?;
        rx.await.map_err(|_| QuorumError::NodeUnavailable)?
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(DriverMessage::Status { reply })
            .await
            .map_err(|_| QuorumError::NodeUnavailable)?;
        rx.await.map_err(|_| QuorumError::NodeUnavailable)
    }

    /// Stream of committed entries. A lagging subscriber misses entries
    /// rather than stalling the node; the log remains the source of truth.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommittedEntry> {
        self.commits.subscribe()
    }
}

/// Bridges the node's synchronous hooks onto logs and the commit stream.
struct DriverObserver {
    node_id: NodeId,
    commits: broadcast::Sender<CommittedEntry>,
}

impl RaftObserver for DriverObserver {
    fn on_role_change(&mut self, term: Term, old: RaftRole, new: RaftRole) {
        tracing::info!(node_id = %self.node_id, term, from = %old, to = %new, "role changed");
    }

    fn on_new_leader(&mut self, leader: &NodeId) {
        tracing::info!(node_id = %self.node_id, leader = %leader, "leader identified");
    }

    fn on_commit(&mut self, coords: LogCoords, data: &[u8]) {
        let _ = self.commits.send(CommittedEntry {
            coords,
            data: data.to_vec(),
        });
    }
}

/// Owns a [`RaftNode`] and drives it from a single task: commands from the
/// handle, timer firings from [`TokioTimers`], outgoing messages into the
/// outbox. Must be created inside a tokio runtime.
pub struct NodeDriver {
    node: RaftNode,
    command_rx: mpsc::Receiver<DriverMessage>,
    timeout_rx: mpsc::Receiver<crate::raft::TimeoutKind>,
    outbox: Box<dyn Outbox>,
}

impl NodeDriver {
    pub fn new(config: &NodeConfig, outbox: Box<dyn Outbox>) -> Result<(Self, NodeHandle)> {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (timeout_tx, timeout_rx) = mpsc::channel(8);
        let (commit_tx, _) = broadcast::channel(256);

        let store: Box<dyn StateStore> = match &config.data_dir {
            Some(dir) => Box::new(FileStateStore::open(dir)?),
            None => Box::new(MemoryStateStore::new()),
        };
        let persistent = PersistentState::open(store)?;
        let cluster = ClusterView::new(&config.node_id, config.peer_ids());
        let observer = DriverObserver {
            node_id: config.node_id.clone(),
            commits: commit_tx.clone(),
        };
        let node = RaftNode::new(
            config.node_id.clone(),
            cluster,
            persistent,
            Box::new(TokioTimers::new(timeout_tx, config)),
            Box::new(observer),
            config.max_append_entries,
        );

        let driver = Self {
            node,
            command_rx,
            timeout_rx,
            outbox,
        };
        let handle = NodeHandle {
            command_tx,
            commits: commit_tx,
        };
        Ok((driver, handle))
    }

    /// Run until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = %self.node.id(), "node loop stopping");
                    break;
                }
                Some(command) = self.command_rx.recv() => self.handle_command(command),
                Some(kind) = self.timeout_rx.recv() => self.handle_input(Input::Timeout(kind)),
            }
        }
    }

    fn handle_command(&mut self, command: DriverMessage) {
        match command {
            DriverMessage::Deliver { from, message } => {
                self.handle_input(Input::Peer { from, message });
            }
            DriverMessage::Append { data, reply } => {
                if self.node.role() != RaftRole::Leader {
                    let hint = self.node.leader_hint().map(|id| id.to_string());
                    let _ = reply.send(Err(QuorumError::NotLeader(hint)));
                    return;
                }
                self.handle_input(Input::Append(data));
                let _ = reply.send(Ok(self.node.log().latest_appended()));
            }
            DriverMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn handle_input(&mut self, input: Input) {
        match self.node.on_message(input) {
            Ok(Output::NoOp { reason }) => {
                tracing::trace!(node_id = %self.node.id(), reason, "nothing to send");
            }
            Ok(Output::Reply { to, response }) => {
                self.outbox.send(&to, PeerMessage::Response(response));
            }
            Ok(Output::Requests(requests)) => {
                for (to, request) in requests {
                    self.outbox.send(&to, PeerMessage::Request(request));
                }
            }
            Err(err) => {
                tracing::error!(node_id = %self.node.id(), %err, "failed to process input");
            }
        }
    }

    fn status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.node.id().to_string(),
            role: self.node.role().to_string(),
            current_term: self.node.current_term(),
            leader_id: self.node.leader_hint().map(|id| id.to_string()),
            commit_index: self.node.log().latest_commit(),
            log_length: self.node.log().len(),
        }
    }
}
