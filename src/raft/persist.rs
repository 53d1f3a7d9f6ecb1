use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{QuorumError, Result};
use crate::raft::message::Response;
use crate::raft::types::{LogCoords, NodeId, Term};

/// Durable backing for the term and vote record. Implementations must make
/// each write visible before returning; the node replies to peers only after
/// the write call has come back.
pub trait StateStore: Send {
    fn load_term(&self) -> Result<Term>;
    fn load_vote(&self, term: Term) -> Result<Option<NodeId>>;
    fn save_term(&mut self, term: Term) -> Result<()>;
    fn save_vote(&mut self, term: Term, candidate: &NodeId) -> Result<()>;
}

/// Volatile store for tests and single-run tooling.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    term: Term,
    votes: HashMap<Term, NodeId>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load_term(&self) -> Result<Term> {
        Ok(self.term)
    }

    fn load_vote(&self, term: Term) -> Result<Option<NodeId>> {
        Ok(self.votes.get(&term).cloned())
    }

    fn save_term(&mut self, term: Term) -> Result<()> {
        self.term = term;
        Ok(())
    }

    fn save_vote(&mut self, term: Term, candidate: &NodeId) -> Result<()> {
        self.votes.insert(term, candidate.clone());
        Ok(())
    }
}

/// Filesystem store. One `currentTerm` file holds the decimal term; each
/// vote lives in its own `<term>.votedFor` file holding the node id. Files
/// are replaced atomically (write to a temp name, then rename), so a crash
/// mid-write leaves the previous value intact.
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn term_path(&self) -> PathBuf {
        self.dir.join("currentTerm")
    }

    fn vote_path(&self, term: Term) -> PathBuf {
        self.dir.join(format!("{term}.votedFor"))
    }

    fn write_atomic(&self, path: PathBuf, contents: &str) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load_term(&self) -> Result<Term> {
        let path = self.term_path();
        if !path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(&path)?;
        raw.trim()
            .parse::<Term>()
            .map_err(|e| QuorumError::CorruptState(format!("currentTerm: {e}")))
    }

    fn load_vote(&self, term: Term) -> Result<Option<NodeId>> {
        let path = self.vote_path(term);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let id = raw.trim();
        if id.is_empty() {
            return Err(QuorumError::CorruptState(format!("{term}.votedFor is empty")));
        }
        Ok(Some(NodeId::from(id)))
    }

    fn save_term(&mut self, term: Term) -> Result<()> {
        self.write_atomic(self.term_path(), &term.to_string())
    }

    fn save_vote(&mut self, term: Term, candidate: &NodeId) -> Result<()> {
        self.write_atomic(self.vote_path(term), candidate.as_str())
    }
}

/// The durable half of a node: `current_term` plus at most one vote per
/// term. Writes go through the store before this struct's view changes, so
/// an acknowledged vote or term survives a restart.
pub struct PersistentState {
    current_term: Term,
    votes: HashMap<Term, NodeId>,
    store: Box<dyn StateStore>,
}

impl PersistentState {
    /// Recover from `store`: the current term and, if present, the vote cast
    /// in it.
    pub fn open(store: Box<dyn StateStore>) -> Result<Self> {
        let current_term = store.load_term()?;
        let mut votes = HashMap::new();
        if let Some(candidate) = store.load_vote(current_term)? {
            votes.insert(current_term, candidate);
        }
        Ok(Self {
            current_term,
            votes,
            store,
        })
    }

    /// Fresh state over a [`MemoryStateStore`].
    pub fn in_memory() -> Self {
        Self {
            current_term: 0,
            votes: HashMap::new(),
            store: Box::new(MemoryStateStore::new()),
        }
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn vote_in(&self, term: Term) -> Option<&NodeId> {
        self.votes.get(&term)
    }

    /// Raise the term. Decreasing it is a bug in the caller and aborts.
    pub fn set_term(&mut self, term: Term) -> Result<()> {
        assert!(
            term >= self.current_term,
            "current term must never decrease ({} -> {})",
            self.current_term,
            term
        );
        if term > self.current_term {
            self.store.save_term(term)?;
            self.current_term = term;
        }
        Ok(())
    }

    /// Record a vote for `candidate` in `term`. Re-recording the same vote
    /// is a no-op; recording a different one is a bug and aborts.
    pub fn record_vote(&mut self, term: Term, candidate: &NodeId) -> Result<()> {
        match self.votes.get(&term) {
            Some(prev) if prev == candidate => Ok(()),
            Some(prev) => panic!(
                "vote in term {term} already cast for {prev}, refusing {candidate}"
            ),
            None => {
                self.store.save_vote(term, candidate)?;
                self.votes.insert(term, candidate.clone());
                Ok(())
            }
        }
    }

    /// Decide a vote request from `from` at `candidate_term` whose log ends
    /// at `candidate_last`, given our own tail `local_last`.
    ///
    /// Order of the rules matters: stale terms are refused outright, a newer
    /// term is adopted before judging the candidate, an existing vote for
    /// someone else blocks the grant, and finally the candidate's log must
    /// be at least as up to date as ours. The vote is persisted before the
    /// reply exists.
    pub fn cast_vote(
        &mut self,
        local_last: LogCoords,
        from: &NodeId,
        candidate_term: Term,
        candidate_last: LogCoords,
    ) -> Result<Response> {
        if candidate_term < self.current_term {
            return Ok(Response::RequestVote {
                term: self.current_term,
                granted: false,
            });
        }
        if candidate_term > self.current_term {
            self.set_term(candidate_term)?;
        }
        if let Some(prev) = self.votes.get(&candidate_term) {
            if prev != from {
                return Ok(Response::RequestVote {
                    term: self.current_term,
                    granted: false,
                });
            }
        }
        // Term-major comparison: the candidate must not be behind us.
        if candidate_last < local_last {
            return Ok(Response::RequestVote {
                term: self.current_term,
                granted: false,
            });
        }
        self.record_vote(candidate_term, from)?;
        Ok(Response::RequestVote {
            term: self.current_term,
            granted: true,
        })
    }
}
