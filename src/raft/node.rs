use crate::error::Result;
use crate::raft::cluster::ClusterView;
use crate::raft::log::RaftLog;
use crate::raft::message::{Input, Output, PeerMessage, Request, Response, TimeoutKind};
use crate::raft::observer::RaftObserver;
use crate::raft::persist::PersistentState;
use crate::raft::state::{CandidateState, FollowerState, LeaderState, NodeState, RaftRole};
use crate::raft::timer::Timers;
use crate::raft::types::{LogCoords, LogEntry, LogIndex, NodeId, Term};

/// The consensus state machine. One logical owner feeds it inputs one at a
/// time through [`RaftNode::on_message`]; each call runs to completion and
/// returns everything there is to send before the next input is looked at.
/// All effects on the log, the durable term/vote record, the role state and
/// the timers happen inside that call, so identical input sequences produce
/// identical histories.
pub struct RaftNode {
    id: NodeId,
    cluster: ClusterView,
    log: RaftLog,
    persistent: PersistentState,
    state: NodeState,
    timers: Box<dyn Timers>,
    observer: Box<dyn RaftObserver>,
    max_append_entries: usize,
}

impl RaftNode {
    pub fn new(
        id: NodeId,
        cluster: ClusterView,
        persistent: PersistentState,
        timers: Box<dyn Timers>,
        observer: Box<dyn RaftObserver>,
        max_append_entries: usize,
    ) -> Self {
        let mut node = Self {
            id,
            cluster,
            log: RaftLog::new(),
            persistent,
            state: NodeState::Follower(FollowerState::default()),
            timers,
            observer,
            max_append_entries,
        };
        // A fresh node waits to hear from a leader before campaigning.
        node.timers.reset_receive_heartbeat();
        node
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn role(&self) -> RaftRole {
        self.state.role()
    }

    pub fn current_term(&self) -> Term {
        self.persistent.current_term()
    }

    pub fn log(&self) -> &RaftLog {
        &self.log
    }

    /// Who this node believes leads the current term, if anyone.
    pub fn leader_hint(&self) -> Option<&NodeId> {
        match &self.state {
            NodeState::Leader(_) => Some(&self.id),
            NodeState::Follower(follower) => follower.leader.as_ref(),
            NodeState::Candidate(_) => None,
        }
    }

    /// Process one input and return the complete outgoing work for it.
    pub fn on_message(&mut self, input: Input) -> Result<Output> {
        match input {
            Input::Peer { from, message } => {
                self.observe_term(message.term())?;
                match message {
                    PeerMessage::Request(request) => self.on_request(from, request),
                    PeerMessage::Response(response) => self.on_response(from, response),
                }
            }
            Input::Timeout(TimeoutKind::ReceiveHeartbeat) => self.on_receive_heartbeat_timeout(),
            Input::Timeout(TimeoutKind::SendHeartbeat) => self.on_send_heartbeat_timeout(),
            Input::Append(data) => self.on_client_append(data),
        }
    }

    /// A term higher than ours demotes us on the spot, before the message
    /// itself is interpreted.
    fn observe_term(&mut self, term: Term) -> Result<()> {
        if term <= self.persistent.current_term() {
            return Ok(());
        }
        tracing::debug!(node_id = %self.id, term, "adopting higher term");
        self.persistent.set_term(term)?;
        self.step_down(None);
        Ok(())
    }

    fn on_request(&mut self, from: NodeId, request: Request) -> Result<Output> {
        match request {
            Request::AppendEntries {
                term,
                prev,
                commit_index,
                entries,
            } => self.on_append_entries(from, term, prev, commit_index, entries),
            Request::RequestVote { term, last_log } => self.on_request_vote(from, term, last_log),
        }
    }

    fn on_response(&mut self, from: NodeId, response: Response) -> Result<Output> {
        match response {
            Response::AppendEntries {
                term,
                success,
                match_index,
            } => self.on_append_entries_response(from, term, success, match_index),
            Response::RequestVote { term, granted } => {
                self.on_request_vote_response(from, term, granted)
            }
        }
    }

    fn on_append_entries(
        &mut self,
        from: NodeId,
        term: Term,
        prev: LogCoords,
        commit_index: LogIndex,
        entries: Vec<LogEntry>,
    ) -> Result<Output> {
        let current = self.persistent.current_term();
        if term < current {
            tracing::debug!(node_id = %self.id, %from, term, current, "refusing stale leader");
            return Ok(Output::Reply {
                to: from,
                response: Response::AppendEntries {
                    term: current,
                    success: false,
                    match_index: 0,
                },
            });
        }

        // The term rule has already run, so term == current here.
        match self.state.role() {
            RaftRole::Leader => panic!(
                "{} and {} both lead term {current}; election safety is broken",
                self.id, from
            ),
            RaftRole::Candidate => {
                // Someone else won this term.
                self.step_down(Some(from.clone()));
                self.observer.on_new_leader(&from);
            }
            RaftRole::Follower => {
                if let NodeState::Follower(follower) = &mut self.state {
                    match follower.leader.clone() {
                        None => {
                            tracing::info!(node_id = %self.id, leader = %from, term, "following new leader");
                            follower.leader = Some(from.clone());
                            self.observer.on_new_leader(&from);
                        }
                        Some(known) if known != from => panic!(
                            "{known} and {from} both lead term {current}; election safety is broken"
                        ),
                        Some(_) => {}
                    }
                }
            }
        }

        self.timers.reset_receive_heartbeat();

        match self.log.append(prev, entries) {
            Ok(outcome) => {
                self.apply_commit(commit_index);
                Ok(Output::Reply {
                    to: from,
                    response: Response::AppendEntries {
                        term: current,
                        success: true,
                        match_index: outcome.last.index,
                    },
                })
            }
            Err(err) => {
                tracing::debug!(node_id = %self.id, %from, %err, "append refused");
                Ok(Output::Reply {
                    to: from,
                    response: Response::AppendEntries {
                        term: current,
                        success: false,
                        match_index: 0,
                    },
                })
            }
        }
    }

    fn on_request_vote(
        &mut self,
        from: NodeId,
        term: Term,
        last_log: LogCoords,
    ) -> Result<Output> {
        let local_last = self.log.latest_appended();
        let response = self
            .persistent
            .cast_vote(local_last, &from, term, last_log)?;
        if matches!(response, Response::RequestVote { granted: true, .. }) {
            tracing::debug!(node_id = %self.id, candidate = %from, term, "granted vote");
            self.timers.reset_receive_heartbeat();
        }
        Ok(Output::Reply { to: from, response })
    }

    fn on_request_vote_response(
        &mut self,
        from: NodeId,
        term: Term,
        granted: bool,
    ) -> Result<Output> {
        let NodeState::Candidate(candidate) = &mut self.state else {
            return Ok(Output::no_op("vote response while not campaigning"));
        };
        if term < candidate.election_term {
            return Ok(Output::no_op("vote response from a previous election"));
        }
        candidate.record_vote(from, granted);
        let (votes_for, votes_against) = candidate.tally();
        let won = candidate.has_quorum();
        tracing::debug!(node_id = %self.id, term, votes_for, votes_against, "tallied vote");
        if won {
            return self.become_leader();
        }
        Ok(Output::no_op("election still undecided"))
    }

    fn on_append_entries_response(
        &mut self,
        from: NodeId,
        term: Term,
        success: bool,
        match_index: LogIndex,
    ) -> Result<Output> {
        let current = self.persistent.current_term();
        let quorum = self.cluster.quorum();
        let NodeState::Leader(leader) = &mut self.state else {
            return Ok(Output::no_op("append response while not leading"));
        };
        if term < current {
            return Ok(Output::no_op("append response from an earlier term"));
        }
        if success {
            leader.record_success(&from, match_index);
            let target = leader.commit_candidate(&self.log, current, quorum);
            if let Some(index) = target {
                self.apply_commit(index);
            }
            // Followers learn the new watermark with the next heartbeat.
            Ok(Output::no_op("replication progress recorded"))
        } else {
            leader.record_failure(&from);
            let next_index = leader.peer(&from).map(|p| p.next_index).unwrap_or(1);
            tracing::debug!(node_id = %self.id, peer = %from, next_index, "walking peer back");
            let request = self.build_append(next_index);
            Ok(Output::Requests(vec![(from, request)]))
        }
    }

    fn on_receive_heartbeat_timeout(&mut self) -> Result<Output> {
        if self.state.role() == RaftRole::Leader {
            // A late firing from before this node won; the countdown is no
            // longer armed.
            return Ok(Output::no_op("leaders ignore election timeouts"));
        }
        let term = self.persistent.current_term() + 1;
        self.persistent.set_term(term)?;
        let self_id = self.id.clone();
        self.persistent.record_vote(term, &self_id)?;
        self.timers.reset_receive_heartbeat();

        if self.cluster.is_empty() {
            tracing::info!(node_id = %self.id, term, "no peers, winning election uncontested");
            return self.become_leader();
        }

        let old = self.state.role();
        self.state = NodeState::Candidate(CandidateState::new(term, self.cluster.size()));
        if old != RaftRole::Candidate {
            self.observer.on_role_change(term, old, RaftRole::Candidate);
        }
        tracing::info!(node_id = %self.id, term, "election timeout, requesting votes");

        let last_log = self.log.latest_appended();
        let requests = self
            .cluster
            .peers()
            .iter()
            .map(|id| (id.clone(), Request::RequestVote { term, last_log }))
            .collect();
        Ok(Output::Requests(requests))
    }

    fn on_send_heartbeat_timeout(&mut self) -> Result<Output> {
        if self.state.role() != RaftRole::Leader {
            return Ok(Output::no_op("heartbeat tick while not leading"));
        }
        self.timers.reset_send_heartbeat();
        Ok(Output::Requests(self.replication_batch()))
    }

    fn on_client_append(&mut self, data: Vec<Vec<u8>>) -> Result<Output> {
        if self.state.role() != RaftRole::Leader {
            let leader = self
                .leader_hint()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string());
            return Ok(Output::no_op(format!("not leader; leader is {leader}")));
        }
        let term = self.persistent.current_term();
        let outcome = self.log.append_local(term, data);
        tracing::debug!(
            node_id = %self.id,
            first = %outcome.first,
            last = %outcome.last,
            "replicating client entries"
        );

        // Requests carry everything from each peer's current next_index, so
        // build them before the optimistic advance.
        let requests = self.replication_batch();
        let past_tail = self.log.latest_appended().index + 1;
        let quorum = self.cluster.quorum();
        let target = if let NodeState::Leader(leader) = &mut self.state {
            leader.advance_next(past_tail);
            leader.commit_candidate(&self.log, term, quorum)
        } else {
            None
        };
        // Quorum of one: nothing to wait for.
        if let Some(index) = target {
            self.apply_commit(index);
        }
        Ok(Output::Requests(requests))
    }

    /// Raise the commit watermark and fire the commit hook for every newly
    /// covered entry, in index order.
    fn apply_commit(&mut self, upto: LogIndex) {
        for coords in self.log.commit(upto) {
            tracing::debug!(node_id = %self.id, coords = %coords, "entry committed");
            let data = self
                .log
                .entry(coords.index)
                .map(|entry| entry.data.clone())
                .unwrap_or_default();
            self.observer.on_commit(coords, &data);
        }
    }

    /// One `AppendEntries` whose entries start at `next_index`. Empty when
    /// the peer is already caught up: a heartbeat.
    fn build_append(&self, next_index: LogIndex) -> Request {
        let prev = if next_index <= 1 {
            LogCoords::EMPTY
        } else {
            self.log
                .coords_for_index(next_index - 1)
                .unwrap_or(LogCoords::EMPTY)
        };
        Request::AppendEntries {
            term: self.persistent.current_term(),
            prev,
            commit_index: self.log.latest_commit(),
            entries: self.log.entries_from(next_index, self.max_append_entries),
        }
    }

    /// One request per peer, each from that peer's own `next_index`.
    fn replication_batch(&self) -> Vec<(NodeId, Request)> {
        let NodeState::Leader(leader) = &self.state else {
            return Vec::new();
        };
        self.cluster
            .peers()
            .iter()
            .map(|id| {
                let next_index = leader
                    .peer(id)
                    .map(|p| p.next_index)
                    .unwrap_or(self.log.latest_appended().index + 1);
                (id.clone(), self.build_append(next_index))
            })
            .collect()
    }

    fn become_leader(&mut self) -> Result<Output> {
        let term = self.persistent.current_term();
        let old = self.state.role();
        self.timers.cancel_receive_heartbeat();
        self.timers.reset_send_heartbeat();
        self.state = NodeState::Leader(LeaderState::new(&self.cluster, self.log.latest_appended()));
        if old != RaftRole::Leader {
            self.observer.on_role_change(term, old, RaftRole::Leader);
        }
        let self_id = self.id.clone();
        self.observer.on_new_leader(&self_id);
        tracing::info!(node_id = %self.id, term, "assumed leadership");
        Ok(Output::Requests(self.replication_batch()))
    }

    fn step_down(&mut self, leader: Option<NodeId>) {
        let term = self.persistent.current_term();
        let old = self.state.role();
        if old == RaftRole::Leader {
            self.timers.cancel_send_heartbeat();
        }
        self.timers.reset_receive_heartbeat();
        self.state = NodeState::Follower(FollowerState { leader });
        if old != RaftRole::Follower {
            self.observer.on_role_change(term, old, RaftRole::Follower);
            tracing::info!(node_id = %self.id, term, was = %old, "stepped down to follower");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::observer::NoopObserver;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct TestTimers {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl TestTimers {
        fn with_journal(events: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self { events }
        }
    }

    impl Timers for TestTimers {
        fn reset_receive_heartbeat(&mut self) {
            self.events.lock().unwrap().push("reset-recv");
        }
        fn reset_send_heartbeat(&mut self) {
            self.events.lock().unwrap().push("reset-send");
        }
        fn cancel_receive_heartbeat(&mut self) {
            self.events.lock().unwrap().push("cancel-recv");
        }
        fn cancel_send_heartbeat(&mut self) {
            self.events.lock().unwrap().push("cancel-send");
        }
    }

    fn node(id: &str, peers: &[&str]) -> RaftNode {
        let id = NodeId::from(id);
        let cluster = ClusterView::new(&id, peers.iter().map(|p| NodeId::from(*p)));
        RaftNode::new(
            id,
            cluster,
            PersistentState::in_memory(),
            Box::<TestTimers>::default(),
            Box::new(NoopObserver),
            64,
        )
    }

    fn election_timeout(node: &mut RaftNode) -> Output {
        node.on_message(Input::Timeout(TimeoutKind::ReceiveHeartbeat))
            .unwrap()
    }

    fn grant(node: &mut RaftNode, from: &str) -> Output {
        let term = node.current_term();
        node.on_message(Input::Peer {
            from: NodeId::from(from),
            message: PeerMessage::Response(Response::RequestVote {
                term,
                granted: true,
            }),
        })
        .unwrap()
    }

    #[test]
    fn test_election_timeout_starts_campaign() {
        let mut a = node("a", &["b", "c"]);
        let out = election_timeout(&mut a);

        assert_eq!(a.role(), RaftRole::Candidate);
        assert_eq!(a.current_term(), 1);
        match out {
            Output::Requests(reqs) => {
                assert_eq!(reqs.len(), 2);
                for (_, req) in &reqs {
                    assert_eq!(
                        *req,
                        Request::RequestVote {
                            term: 1,
                            last_log: LogCoords::EMPTY
                        }
                    );
                }
            }
            other => panic!("expected vote requests, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_peer_cluster_elects_itself() {
        let mut a = node("a", &[]);
        let out = election_timeout(&mut a);
        assert_eq!(a.role(), RaftRole::Leader);
        assert_eq!(a.current_term(), 1);
        assert_eq!(out, Output::Requests(Vec::new()));
    }

    #[test]
    fn test_majority_vote_wins_and_heartbeats_go_out() {
        let mut a = node("a", &["b", "c"]);
        election_timeout(&mut a);
        let out = grant(&mut a, "b");

        assert_eq!(a.role(), RaftRole::Leader);
        match out {
            Output::Requests(reqs) => {
                assert_eq!(reqs.len(), 2);
                for (_, req) in &reqs {
                    assert_eq!(
                        *req,
                        Request::AppendEntries {
                            term: 1,
                            prev: LogCoords::EMPTY,
                            commit_index: 0,
                            entries: Vec::new()
                        }
                    );
                }
            }
            other => panic!("expected heartbeats, got {other:?}"),
        }
    }

    #[test]
    fn test_denied_votes_do_not_win() {
        let mut a = node("a", &["b", "c", "d", "e"]);
        election_timeout(&mut a);
        a.on_message(Input::Peer {
            from: NodeId::from("b"),
            message: PeerMessage::Response(Response::RequestVote {
                term: 1,
                granted: false,
            }),
        })
        .unwrap();
        grant(&mut a, "c");
        assert_eq!(a.role(), RaftRole::Candidate);
        grant(&mut a, "d");
        assert_eq!(a.role(), RaftRole::Leader);
    }

    #[test]
    fn test_append_while_not_leader_names_the_leader() {
        let mut a = node("a", &["b"]);
        let out = a.on_message(Input::Append(vec![b"x".to_vec()])).unwrap();
        assert_eq!(out, Output::no_op("not leader; leader is none"));

        // Learn about a leader, then ask again.
        a.on_message(Input::Peer {
            from: NodeId::from("b"),
            message: PeerMessage::Request(Request::AppendEntries {
                term: 1,
                prev: LogCoords::EMPTY,
                commit_index: 0,
                entries: Vec::new(),
            }),
        })
        .unwrap();
        let out = a.on_message(Input::Append(vec![b"x".to_vec()])).unwrap();
        assert_eq!(out, Output::no_op("not leader; leader is b"));
    }

    #[test]
    fn test_higher_term_response_steps_leader_down() {
        let mut a = node("a", &["b"]);
        election_timeout(&mut a);
        grant(&mut a, "b");
        assert_eq!(a.role(), RaftRole::Leader);

        let out = a
            .on_message(Input::Peer {
                from: NodeId::from("b"),
                message: PeerMessage::Response(Response::AppendEntries {
                    term: 2,
                    success: false,
                    match_index: 0,
                }),
            })
            .unwrap();
        assert_eq!(a.role(), RaftRole::Follower);
        assert_eq!(a.current_term(), 2);
        // Demoted before interpretation; the stale-looking response is then
        // discarded because this node no longer leads.
        assert_eq!(out, Output::no_op("append response while not leading"));
    }

    #[test]
    #[should_panic(expected = "election safety is broken")]
    fn test_two_leaders_in_one_term_abort() {
        let mut a = node("a", &["b"]);
        election_timeout(&mut a);
        grant(&mut a, "b");
        assert_eq!(a.role(), RaftRole::Leader);

        let _ = a.on_message(Input::Peer {
            from: NodeId::from("b"),
            message: PeerMessage::Request(Request::AppendEntries {
                term: 1,
                prev: LogCoords::EMPTY,
                commit_index: 0,
                entries: Vec::new(),
            }),
        });
    }

    #[test]
    fn test_stale_append_entries_rejected_without_touching_log() {
        let mut a = node("a", &["b"]);
        a.on_message(Input::Peer {
            from: NodeId::from("b"),
            message: PeerMessage::Request(Request::AppendEntries {
                term: 3,
                prev: LogCoords::EMPTY,
                commit_index: 0,
                entries: vec![LogEntry::new(3, b"x".to_vec())],
            }),
        })
        .unwrap();
        assert_eq!(a.log().len(), 1);

        let out = a
            .on_message(Input::Peer {
                from: NodeId::from("c"),
                message: PeerMessage::Request(Request::AppendEntries {
                    term: 1,
                    prev: LogCoords::EMPTY,
                    commit_index: 0,
                    entries: vec![LogEntry::new(1, b"y".to_vec())],
                }),
            })
            .unwrap();
        assert_eq!(
            out,
            Output::Reply {
                to: NodeId::from("c"),
                response: Response::AppendEntries {
                    term: 3,
                    success: false,
                    match_index: 0
                }
            }
        );
        assert_eq!(a.log().len(), 1);
    }

    #[test]
    fn test_leader_transition_swaps_timers() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let id = NodeId::from("a");
        let cluster = ClusterView::new(&id, [NodeId::from("b")]);
        let mut a = RaftNode::new(
            id,
            cluster,
            PersistentState::in_memory(),
            Box::new(TestTimers::with_journal(events.clone())),
            Box::new(NoopObserver),
            64,
        );
        election_timeout(&mut a);
        grant(&mut a, "b");

        let journal = events.lock().unwrap().clone();
        // new() arms the countdown, the campaign re-arms it, then winning
        // swaps the countdown for the heartbeat cadence.
        assert_eq!(
            journal,
            vec!["reset-recv", "reset-recv", "cancel-recv", "reset-send"]
        );
    }

    #[test]
    fn test_duplicate_vote_responses_do_not_double_count() {
        let mut a = node("a", &["b", "c", "d", "e"]);
        election_timeout(&mut a);
        grant(&mut a, "b");
        grant(&mut a, "b");
        assert_eq!(a.role(), RaftRole::Candidate);
        grant(&mut a, "c");
        assert_eq!(a.role(), RaftRole::Leader);
    }

    #[test]
    fn test_vote_response_ignored_when_not_campaigning() {
        let mut a = node("a", &["b"]);
        let out = grant(&mut a, "b");
        assert_eq!(out, Output::no_op("vote response while not campaigning"));
        assert_eq!(a.role(), RaftRole::Follower);
    }
}
