use crate::raft::types::{LogCoords, LogEntry, LogIndex, Term};

/// Why a follower-side append was refused. These are protocol results, not
/// failures; the orchestrator turns them into `success = false` replies and
/// the leader repairs the divergence through its `next_index` bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AppendError {
    /// The append would start past the current tail.
    #[error("append starts past the log tail")]
    Skip,
    /// The first incoming entry is older than the latest appended term.
    #[error("entries carry an earlier term than the log tail")]
    EarlierTerm,
    /// No local entry matches the previous coordinates.
    #[error("no entry at the previous coordinates")]
    MissingPrevious,
}

/// What a successful append did. `first`/`last` are
/// [`LogCoords::EMPTY`] for a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub first: LogCoords,
    pub last: LogCoords,
    /// Indices whose previous occupants were truncated away.
    pub replaced: Vec<LogIndex>,
}

impl AppendOutcome {
    fn heartbeat() -> Self {
        Self {
            first: LogCoords::EMPTY,
            last: LogCoords::EMPTY,
            replaced: Vec::new(),
        }
    }
}

/// The replicated log: contiguous entries starting at index 1, terms
/// non-decreasing along the log, plus the commit watermark. The committed
/// prefix is immutable; truncating into it aborts the process because it
/// means two leaders committed divergent histories.
#[derive(Debug, Default)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
    commit_index: LogIndex,
}

impl RaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coordinates of the last appended entry, or `EMPTY`.
    pub fn latest_appended(&self) -> LogCoords {
        match self.entries.last() {
            Some(entry) => LogCoords::new(entry.term, self.entries.len() as LogIndex),
            None => LogCoords::EMPTY,
        }
    }

    /// Highest committed index; starts at 0.
    pub fn latest_commit(&self) -> LogIndex {
        self.commit_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    pub fn term_for_index(&self, index: LogIndex) -> Option<Term> {
        self.entry(index).map(|e| e.term)
    }

    pub fn coords_for_index(&self, index: LogIndex) -> Option<LogCoords> {
        self.term_for_index(index)
            .map(|term| LogCoords::new(term, index))
    }

    /// Whether `coords` names an entry this log holds. `EMPTY` is always
    /// contained: it is the position before the first entry.
    pub fn contains(&self, coords: LogCoords) -> bool {
        if coords.is_empty() {
            return true;
        }
        self.term_for_index(coords.index) == Some(coords.term)
    }

    /// Up to `max` contiguous entries starting at `index`.
    pub fn entries_from(&self, index: LogIndex, max: usize) -> Vec<LogEntry> {
        if index == 0 || index as usize > self.entries.len() {
            return Vec::new();
        }
        self.entries[index as usize - 1..]
            .iter()
            .take(max)
            .cloned()
            .collect()
    }

    /// Append entries received from a leader, rooted at `prev`.
    ///
    /// An empty batch is a heartbeat and succeeds without further checks.
    /// Otherwise the batch must anchor at an entry we hold, must not start
    /// past the tail, and must not carry a term older than the tail. Entries
    /// that conflict with existing ones (same index, different term) replace
    /// the whole tail from the first conflict; duplicates of entries already
    /// present are left in place, so re-applying the same request is a no-op.
    pub fn append(
        &mut self,
        prev: LogCoords,
        entries: Vec<LogEntry>,
    ) -> Result<AppendOutcome, AppendError> {
        if entries.is_empty() {
            return Ok(AppendOutcome::heartbeat());
        }
        let latest = self.latest_appended();
        if prev.index > latest.index {
            return Err(AppendError::Skip);
        }
        if !self.contains(prev) {
            return Err(AppendError::MissingPrevious);
        }
        if entries[0].term < latest.term {
            return Err(AppendError::EarlierTerm);
        }
        let target = prev.index + 1;

        let mut replaced = Vec::new();
        for (offset, incoming) in entries.iter().enumerate() {
            let index = target + offset as LogIndex;
            match self.term_for_index(index) {
                Some(term) if term != incoming.term => {
                    assert!(
                        index > self.commit_index,
                        "refusing to truncate committed entry {} (commit watermark {})",
                        index,
                        self.commit_index
                    );
                    replaced = (index..=self.latest_appended().index).collect();
                    self.entries.truncate(index as usize - 1);
                    break;
                }
                _ => {}
            }
        }
        for (offset, incoming) in entries.iter().enumerate() {
            let index = target + offset as LogIndex;
            if index > self.latest_appended().index {
                self.entries.push(incoming.clone());
            }
        }

        let last_term = entries[entries.len() - 1].term;
        Ok(AppendOutcome {
            first: LogCoords::new(entries[0].term, target),
            last: LogCoords::new(last_term, target + entries.len() as LogIndex - 1),
            replaced,
        })
    }

    /// Append client payloads at the tail, stamped with `term`. The leader
    /// path: never truncates, never reorders.
    pub fn append_local(&mut self, term: Term, data: Vec<Vec<u8>>) -> AppendOutcome {
        if data.is_empty() {
            return AppendOutcome::heartbeat();
        }
        let latest = self.latest_appended();
        assert!(
            term >= latest.term,
            "local append at term {} behind log tail {}",
            term,
            latest
        );
        let first = LogCoords::new(term, latest.index + 1);
        for payload in data {
            self.entries.push(LogEntry::new(term, payload));
        }
        AppendOutcome {
            first,
            last: self.latest_appended(),
            replaced: Vec::new(),
        }
    }

    /// Raise the commit watermark to `min(upto, latest_appended)` and return
    /// the coordinates newly covered, in index order. Monotonic: a lower
    /// `upto` leaves the log untouched.
    pub fn commit(&mut self, upto: LogIndex) -> Vec<LogCoords> {
        let target = upto.min(self.latest_appended().index);
        if target <= self.commit_index {
            return Vec::new();
        }
        let newly: Vec<LogCoords> = (self.commit_index + 1..=target)
            .filter_map(|index| self.coords_for_index(index))
            .collect();
        self.commit_index = target;
        newly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: Term, data: &str) -> LogEntry {
        LogEntry::new(term, data.as_bytes().to_vec())
    }

    fn log_with(terms: &[Term]) -> RaftLog {
        let mut log = RaftLog::new();
        for (i, &term) in terms.iter().enumerate() {
            log.append_local(term, vec![format!("e{}", i + 1).into_bytes()]);
        }
        log
    }

    #[test]
    fn test_empty_log() {
        let log = RaftLog::new();
        assert_eq!(log.latest_appended(), LogCoords::EMPTY);
        assert_eq!(log.latest_commit(), 0);
        assert!(log.contains(LogCoords::EMPTY));
        assert!(!log.contains(LogCoords::new(1, 1)));
    }

    #[test]
    fn test_heartbeat_append_succeeds_with_empty_coords() {
        let mut log = log_with(&[1, 1]);
        let out = log.append(LogCoords::new(1, 2), Vec::new()).unwrap();
        assert_eq!(out.first, LogCoords::EMPTY);
        assert_eq!(out.last, LogCoords::EMPTY);
        assert!(out.replaced.is_empty());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_first_append_anchors_at_empty() {
        let mut log = RaftLog::new();
        let out = log.append(LogCoords::EMPTY, vec![entry(1, "x")]).unwrap();
        assert_eq!(out.first, LogCoords::new(1, 1));
        assert_eq!(out.last, LogCoords::new(1, 1));
        assert_eq!(log.latest_appended(), LogCoords::new(1, 1));
    }

    #[test]
    fn test_append_missing_previous() {
        // Anchor within range but with a mismatched term.
        let mut log = log_with(&[1]);
        let err = log
            .append(LogCoords::new(2, 1), vec![entry(2, "y")])
            .unwrap_err();
        assert_eq!(err, AppendError::MissingPrevious);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_append_past_tail_is_skipped() {
        let mut log = log_with(&[1]);
        let err = log
            .append(LogCoords::new(1, 3), vec![entry(1, "y")])
            .unwrap_err();
        assert_eq!(err, AppendError::Skip);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_append_earlier_term_rejected() {
        let mut log = log_with(&[2]);
        let err = log
            .append(LogCoords::new(2, 1), vec![entry(1, "stale")])
            .unwrap_err();
        assert_eq!(err, AppendError::EarlierTerm);
    }

    #[test]
    fn test_conflicting_tail_is_truncated() {
        // Follower holds [(1,1), (1,2), (1,3)]; the new leader overwrites
        // from index 2 with a term-2 entry.
        let mut log = log_with(&[1, 1, 1]);
        let out = log
            .append(LogCoords::new(1, 1), vec![entry(2, "y")])
            .unwrap();
        assert_eq!(out.first, LogCoords::new(2, 2));
        assert_eq!(out.last, LogCoords::new(2, 2));
        assert_eq!(out.replaced, vec![2, 3]);
        assert_eq!(log.latest_appended(), LogCoords::new(2, 2));
        assert_eq!(log.term_for_index(1), Some(1));
        assert_eq!(log.term_for_index(2), Some(2));
    }

    #[test]
    fn test_duplicate_append_is_idempotent() {
        let mut log = RaftLog::new();
        let batch = vec![entry(1, "a"), entry(1, "b")];
        let first = log.append(LogCoords::EMPTY, batch.clone()).unwrap();
        let second = log.append(LogCoords::EMPTY, batch).unwrap();
        assert_eq!(first, second);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_commit_is_monotonic_and_clamped() {
        let mut log = log_with(&[1, 1, 2]);
        // Clamp past the tail.
        let newly = log.commit(10);
        assert_eq!(
            newly,
            vec![
                LogCoords::new(1, 1),
                LogCoords::new(1, 2),
                LogCoords::new(2, 3)
            ]
        );
        assert_eq!(log.latest_commit(), 3);
        // Lower watermark is a no-op.
        assert!(log.commit(2).is_empty());
        assert_eq!(log.latest_commit(), 3);
        assert!(log.commit(3).is_empty());
    }

    #[test]
    fn test_commit_returns_newly_covered_only() {
        let mut log = log_with(&[1, 1, 1]);
        assert_eq!(log.commit(1), vec![LogCoords::new(1, 1)]);
        assert_eq!(
            log.commit(3),
            vec![LogCoords::new(1, 2), LogCoords::new(1, 3)]
        );
    }

    #[test]
    fn test_entries_from_respects_max() {
        let log = log_with(&[1, 1, 2, 2]);
        let slice = log.entries_from(2, 2);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].term, 1);
        assert_eq!(slice[1].term, 2);
        assert!(log.entries_from(5, 8).is_empty());
        assert!(log.entries_from(0, 8).is_empty());
    }

    #[test]
    fn test_local_append_assigns_contiguous_indices() {
        let mut log = RaftLog::new();
        let out = log.append_local(1, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(out.first, LogCoords::new(1, 1));
        assert_eq!(out.last, LogCoords::new(1, 2));
        let out = log.append_local(3, vec![b"c".to_vec()]);
        assert_eq!(out.first, LogCoords::new(3, 3));
        assert_eq!(log.latest_appended(), LogCoords::new(3, 3));
    }

    #[test]
    #[should_panic(expected = "refusing to truncate committed entry")]
    fn test_truncating_committed_prefix_aborts() {
        let mut log = log_with(&[1, 1]);
        log.commit(2);
        let _ = log.append(LogCoords::new(1, 1), vec![entry(2, "boom")]);
    }

    #[test]
    fn test_append_at_exact_tail_is_allowed() {
        let mut log = RaftLog::new();
        log.append_local(1, vec![b"a".to_vec()]);
        let out = log.append(LogCoords::new(1, 1), vec![entry(1, "b")]).unwrap();
        assert_eq!(out.last, LogCoords::new(1, 2));
        assert_eq!(log.len(), 2);
    }
}
