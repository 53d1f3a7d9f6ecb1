pub mod cluster;
pub mod log;
pub mod message;
pub mod node;
pub mod observer;
pub mod persist;
pub mod state;
pub mod timer;
pub mod types;

pub use cluster::ClusterView;
pub use message::{Input, Output, PeerMessage, Request, Response, TimeoutKind};
pub use node::RaftNode;
pub use observer::{NoopObserver, RaftObserver};
pub use persist::{FileStateStore, MemoryStateStore, PersistentState, StateStore};
pub use state::{NodeState, RaftRole};
pub use timer::Timers;
pub use types::{LogCoords, LogEntry, LogIndex, NodeId, Term};
