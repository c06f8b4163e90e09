use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify, RwLock, RwLockWriteGuard};
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};

use crate::config::NodeConfig;
use crate::error::{RaftError, Result};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::rpc::{handle_append_entries, handle_request_vote, log_entry_to_proto};
use crate::raft::state::{LogEntry, RaftRole, RaftState, StatusReport};
use crate::raft::timer::random_election_timeout;

/// The consensus core of one peer.
///
/// All protocol state lives in `state` behind a single lock. The lock is never
/// held across an outbound RPC: every fan-out snapshots what it needs, drops
/// the guard and spawns one task per peer, each of which re-acquires the lock
/// to apply its reply.
pub struct RaftNode {
    pub id: u64,
    pub state: RwLock<RaftState>,
    config: NodeConfig,
    peers: Mutex<HashMap<u64, RaftServiceClient<Channel>>>,
    active: AtomicBool,
    replicate: Notify,
    commit_tx: watch::Sender<u64>,
}

/// What a leader sent to one follower, kept to interpret the reply
struct InFlightAppend {
    peer_id: u64,
    term: u64,
    next_index: u64,
    request: AppendEntriesRequest,
}

impl RaftNode {
    pub fn new(config: NodeConfig) -> Self {
        let (commit_tx, _) = watch::channel(0);
        let mut state = RaftState::new();
        state.reset_election_timer(random_election_timeout(
            config.election_timeout_min_ms,
            config.election_timeout_max_ms,
        ));

        Self {
            id: config.node_id,
            state: RwLock::new(state),
            config,
            peers: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
            replicate: Notify::new(),
            commit_tx,
        }
    }

    /// Whether the peer currently sends and accepts RPCs
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Resume protocol activity after a pause.
    ///
    /// Only the election timer restarts, so a peer coming back gets a full
    /// timeout to hear from the current leader. Term, vote, role and log are
    /// left as they were.
    pub async fn resume(&self) {
        self.state
            .write()
            .await
            .reset_election_timer(self.new_election_timeout());
        self.set_active(true);
    }

    /// Watch the commit index; changes on every advance
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.commit_tx.subscribe()
    }

    fn new_election_timeout(&self) -> Duration {
        random_election_timeout(
            self.config.election_timeout_min_ms,
            self.config.election_timeout_max_ms,
        )
    }

    fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.config.rpc_timeout_ms)
    }

    fn publish_commit(&self, commit_index: u64) {
        self.commit_tx.send_replace(commit_index);
    }

    /// Create lazily connected clients for every peer not yet known
    pub async fn connect_to_peers(&self) -> Result<()> {
        let mut peers = self.peers.lock().await;
        for peer_id in self.config.peer_ids() {
            if peers.contains_key(&peer_id) {
                continue;
            }
            let addr = format!("http://{}", self.config.peer_addr(peer_id));
            let channel = Endpoint::from_shared(addr.clone())?
                .connect_timeout(self.rpc_timeout())
                .timeout(self.rpc_timeout())
                .connect_lazy();
            tracing::debug!(node_id = self.id, peer_id, addr = %addr, "Peer client ready");
            peers.insert(peer_id, RaftServiceClient::new(channel));
        }
        Ok(())
    }

    async fn peer_client(&self, peer_id: u64) -> Option<RaftServiceClient<Channel>> {
        self.peers.lock().await.get(&peer_id).cloned()
    }

    /// Run the timer-driven loop until `cancel` fires.
    ///
    /// Followers and candidates wait for their election deadline; leaders
    /// send AppendEntries every heartbeat interval. Either role replicates
    /// immediately when woken through `replicate`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let heartbeat = Duration::from_millis(self.config.heartbeat_interval_ms);
        tracing::info!(node_id = self.id, "Raft driver started");

        loop {
            let (role, deadline) = {
                let state = self.state.read().await;
                (state.role, state.election_deadline())
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                }

                // New command or fresh leadership
                _ = self.replicate.notified() => {
                    self.broadcast_append_entries().await;
                }

                // Heartbeat interval (for leaders)
                _ = tokio::time::sleep(heartbeat), if role == RaftRole::Leader => {
                    self.broadcast_append_entries().await;
                }

                // Election timeout (for followers and candidates)
                _ = tokio::time::sleep_until(deadline), if role != RaftRole::Leader => {
                    self.check_election_timeout().await;
                }
            }
        }

        tracing::info!(node_id = self.id, "Raft driver stopped");
    }

    /// Start an election only if the deadline has really passed.
    ///
    /// The deadline is checked under the same write guard that moves the
    /// peer to candidate, so a heartbeat that lands first cancels it.
    async fn check_election_timeout(self: &Arc<Self>) {
        if !self.is_active() {
            return;
        }
        let state = self.state.write().await;
        if state.role == RaftRole::Leader || Instant::now() < state.election_deadline() {
            return;
        }
        tracing::info!(
            node_id = self.id,
            term = state.current_term,
            elapsed_ms = state.last_contact.elapsed().as_millis() as u64,
            "Election timeout, starting election"
        );
        self.campaign(state);
    }

    /// Start a new election regardless of the timer
    pub async fn start_election(self: &Arc<Self>) {
        let state = self.state.write().await;
        self.campaign(state);
    }

    fn campaign(self: &Arc<Self>, mut state: RwLockWriteGuard<'_, RaftState>) {
        state.become_candidate(self.id);
        state.reset_election_timer(self.new_election_timeout());

        let term = state.current_term;
        let req = VoteRequest {
            term,
            candidate_id: self.id,
            last_log_index: state.last_log_index(),
            last_log_term: state.last_log_term(),
        };

        // A lone peer already holds a majority
        if state.votes_received.len() as u64 >= self.config.quorum() {
            state.become_leader(self.id, &self.config.peer_ids());
            tracing::info!(node_id = self.id, term, votes = 1, "Became leader");
            drop(state);
            self.replicate.notify_one();
            return;
        }
        drop(state);

        tracing::info!(node_id = self.id, term, "Starting election");

        for peer_id in self.config.peer_ids() {
            let node = Arc::clone(self);
            let req = req.clone();
            tokio::spawn(async move {
                node.request_vote_from(peer_id, req).await;
            });
        }
    }

    async fn request_vote_from(self: Arc<Self>, peer_id: u64, req: VoteRequest) {
        if !self.is_active() {
            return;
        }
        let Some(mut client) = self.peer_client(peer_id).await else {
            return;
        };

        let term = req.term;
        match timeout(self.rpc_timeout(), client.request_vote(req)).await {
            Ok(Ok(response)) => {
                self.handle_vote_response(peer_id, term, response.into_inner())
                    .await;
            }
            Ok(Err(e)) => {
                tracing::trace!(node_id = self.id, peer_id, error = %e, "Vote request failed");
            }
            Err(_) => {
                tracing::trace!(node_id = self.id, peer_id, "Vote request timed out");
            }
        }
    }

    async fn handle_vote_response(&self, peer_id: u64, election_term: u64, resp: VoteResponse) {
        if !self.is_active() {
            return;
        }
        let mut state = self.state.write().await;

        if resp.term > state.current_term {
            tracing::info!(
                node_id = self.id,
                peer_id,
                term = resp.term,
                "Higher term in vote reply, stepping down"
            );
            state.become_follower(resp.term);
            return;
        }

        // Ignore replies for an election we are no longer running
        if state.role != RaftRole::Candidate
            || state.current_term != election_term
            || !resp.vote_granted
        {
            return;
        }

        let votes = state.record_vote(peer_id);
        tracing::debug!(
            node_id = self.id,
            peer_id,
            term = election_term,
            votes,
            "Received vote"
        );

        if votes >= self.config.quorum() {
            state.become_leader(self.id, &self.config.peer_ids());
            tracing::info!(node_id = self.id, term = election_term, votes, "Became leader");
            drop(state);
            // Assert leadership right away
            self.replicate.notify_one();
        }
    }

    /// Send AppendEntries to all followers (leader only)
    pub async fn broadcast_append_entries(self: &Arc<Self>) {
        if !self.is_active() {
            return;
        }

        let batch: Vec<InFlightAppend> = {
            let state = self.state.read().await;
            if state.role != RaftRole::Leader {
                return;
            }

            self.config
                .peer_ids()
                .into_iter()
                .map(|peer_id| {
                    let next_index = state
                        .next_index
                        .get(&peer_id)
                        .copied()
                        .unwrap_or(1)
                        .clamp(1, state.last_log_index() + 1);
                    let prev_log_index = next_index - 1;
                    let request = AppendEntriesRequest {
                        term: state.current_term,
                        leader_id: self.id,
                        prev_log_index,
                        prev_log_term: state.term_at(prev_log_index).unwrap_or(0),
                        entries: state
                            .get_entries_from(next_index)
                            .iter()
                            .map(log_entry_to_proto)
                            .collect(),
                        leader_commit: state.commit_index,
                    };
                    InFlightAppend {
                        peer_id,
                        term: state.current_term,
                        next_index,
                        request,
                    }
                })
                .collect()
        };

        for append in batch {
            let node = Arc::clone(self);
            tokio::spawn(async move {
                node.replicate_to(append).await;
            });
        }
    }

    async fn replicate_to(self: Arc<Self>, append: InFlightAppend) {
        if !self.is_active() {
            return;
        }
        let Some(mut client) = self.peer_client(append.peer_id).await else {
            return;
        };

        let peer_id = append.peer_id;
        match timeout(
            self.rpc_timeout(),
            client.append_entries(append.request.clone()),
        )
        .await
        {
            Ok(Ok(response)) => {
                self.handle_append_response(append, response.into_inner())
                    .await;
            }
            Ok(Err(e)) => {
                tracing::trace!(node_id = self.id, peer_id, error = %e, "AppendEntries failed");
            }
            Err(_) => {
                tracing::trace!(node_id = self.id, peer_id, "AppendEntries timed out");
            }
        }
    }

    async fn handle_append_response(&self, sent: InFlightAppend, resp: AppendEntriesResponse) {
        if !self.is_active() {
            return;
        }
        let mut state = self.state.write().await;
        let peer_id = sent.peer_id;

        if resp.term > state.current_term {
            tracing::info!(
                node_id = self.id,
                peer_id,
                term = resp.term,
                "Higher term in AppendEntries reply, stepping down"
            );
            state.become_follower(resp.term);
            return;
        }

        // Stale reply from an earlier leadership
        if state.role != RaftRole::Leader || state.current_term != sent.term {
            return;
        }

        if resp.success {
            // Never trust a follower past what this leader holds
            let replicated = resp.match_index.min(state.last_log_index());
            let match_index = state.match_index.entry(peer_id).or_insert(0);
            if replicated > *match_index {
                *match_index = replicated;
            }
            let next_index = *match_index + 1;
            state.next_index.insert(peer_id, next_index);

            if state.advance_commit_index(self.config.quorum()) {
                tracing::debug!(
                    node_id = self.id,
                    commit_index = state.commit_index,
                    "Updated commit index"
                );
                self.publish_commit(state.commit_index);
            }
        } else {
            // Only back off once per probe; late duplicates are ignored
            let current = state.next_index.get(&peer_id).copied().unwrap_or(1);
            if current != sent.next_index {
                return;
            }
            let hint = if resp.conflict_index == 0 {
                current.saturating_sub(1)
            } else {
                resp.conflict_index.min(current.saturating_sub(1))
            };
            let floor = state.match_index.get(&peer_id).copied().unwrap_or(0) + 1;
            let next_index = hint.max(floor).max(1);
            state.next_index.insert(peer_id, next_index);
            tracing::debug!(
                node_id = self.id,
                peer_id,
                next_index,
                "Follower log mismatch, backing off"
            );
        }
    }

    /// Handle incoming RequestVote RPC
    pub async fn handle_vote_request(&self, req: VoteRequest) -> VoteResponse {
        let mut state = self.state.write().await;
        let response = handle_request_vote(&mut state, &req, self.id);

        // Reset election timeout if we granted vote
        if response.vote_granted {
            state.reset_election_timer(self.new_election_timeout());
        }

        response
    }

    /// Handle incoming AppendEntries RPC
    pub async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let mut state = self.state.write().await;
        let commit_before = state.commit_index;
        let response = handle_append_entries(&mut state, &req, self.id);

        // Any request from the current leader counts as contact, even if
        // the consistency check failed
        if req.term == response.term {
            state.reset_election_timer(self.new_election_timeout());
        }
        if state.commit_index > commit_before {
            self.publish_commit(state.commit_index);
        }

        response
    }

    /// Append a client command to the log (leader only).
    ///
    /// Returns as soon as the entry is in the local log; replication and
    /// commitment happen in the background.
    pub async fn new_command(&self, command: Vec<u8>) -> Result<StatusReport> {
        let mut state = self.state.write().await;

        if state.role != RaftRole::Leader {
            return Err(RaftError::NotLeader(state.leader_id));
        }

        let index = state.append_entry(command).index;
        state.call_count += 1;
        tracing::debug!(
            node_id = self.id,
            index,
            term = state.current_term,
            "Appended command to log"
        );

        // Only a single-peer cluster can commit without replies
        if state.advance_commit_index(self.config.quorum()) {
            self.publish_commit(state.commit_index);
        }

        let report = StatusReport {
            index,
            term: state.current_term,
            is_leader: true,
            call_count: state.call_count,
        };
        drop(state);

        self.replicate.notify_one();
        Ok(report)
    }

    /// Command committed at `index`, if any
    pub async fn get_committed_cmd(&self, index: u64) -> Option<Vec<u8>> {
        self.state
            .read()
            .await
            .committed_command(index)
            .map(|c| c.to_vec())
    }

    pub async fn get_status(&self) -> StatusReport {
        self.state.read().await.status()
    }

    /// Check if this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.state.read().await.role == RaftRole::Leader
    }

    /// Get the current leader ID
    pub async fn get_leader_id(&self) -> Option<u64> {
        let state = self.state.read().await;
        if state.role == RaftRole::Leader {
            Some(self.id)
        } else {
            state.leader_id
        }
    }

    /// Get entries that have been committed but not yet applied
    pub async fn take_committed_entries(&self) -> Vec<LogEntry> {
        self.state.write().await.take_committed_entries()
    }
}
