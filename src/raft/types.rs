use std::fmt;

use serde::{Deserialize, Serialize};

/// Election epoch. Never decreases at any node.
pub type Term = u64;

/// Position in the replicated log. Real entries start at index 1;
/// index 0 means "before any entry".
pub type LogIndex = u64;

/// Opaque identifier of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A `(term, index)` position in the log.
///
/// The derived ordering is term-major, which is exactly the
/// "log up-to-date" comparison used to gate vote grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogCoords {
    pub term: Term,
    pub index: LogIndex,
}

impl LogCoords {
    /// The position before any entry.
    pub const EMPTY: LogCoords = LogCoords { term: 0, index: 0 };

    pub fn new(term: Term, index: LogIndex) -> Self {
        Self { term, index }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for LogCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.term, self.index)
    }
}

/// A single replicated entry. The payload is opaque to consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn new(term: Term, data: impl Into<Vec<u8>>) -> Self {
        Self {
            term,
            data: data.into(),
        }
    }
}
