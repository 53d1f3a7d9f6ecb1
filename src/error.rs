use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("persistent state I/O failed: {0}")]
    StateStore(#[from] std::io::Error),

    #[error("persistent state is corrupt: {0}")]
    CorruptState(String),

    #[error("node event loop is gone")]
    NodeUnavailable,

    #[error("not the leader; leader is {}", .0.as_deref().unwrap_or("none"))]
    NotLeader(Option<String>),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, QuorumError>;
