use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntry as ProtoLogEntry, VoteRequest,
    VoteResponse,
};
use crate::raft::state::{LogEntry, RaftRole, RaftState, StatusReport};

/// Handle RequestVote RPC
pub fn handle_request_vote(state: &mut RaftState, req: &VoteRequest, my_id: u64) -> VoteResponse {
    // If request term is greater, update our term and become follower
    if req.term > state.current_term {
        state.become_follower(req.term);
    }

    let vote_granted = if req.term < state.current_term {
        // Reject if request term is less than our current term
        false
    } else if state.voted_for.is_some() && state.voted_for != Some(req.candidate_id) {
        // Already voted for someone else in this term
        false
    } else if !state.is_log_up_to_date(req.last_log_index, req.last_log_term) {
        // Candidate's log is not up-to-date
        false
    } else {
        state.voted_for = Some(req.candidate_id);
        true
    };

    tracing::debug!(
        node_id = my_id,
        candidate = req.candidate_id,
        term = req.term,
        granted = vote_granted,
        "RequestVote response"
    );

    VoteResponse {
        term: state.current_term,
        vote_granted,
    }
}

/// Handle AppendEntries RPC
pub fn handle_append_entries(
    state: &mut RaftState,
    req: &AppendEntriesRequest,
    my_id: u64,
) -> AppendEntriesResponse {
    // Reject if request term is less than our current term
    if req.term < state.current_term {
        return reject(state, 0);
    }

    // Valid leader for this term: adopt it and step down if needed
    state.become_follower(req.term);
    state.leader_id = Some(req.leader_id);

    // Consistency check on the entry preceding the new ones
    match state.term_at(req.prev_log_index) {
        Some(term) if term == req.prev_log_term => {}
        _ => {
            let conflict_index = state.conflict_index(req.prev_log_index);
            tracing::debug!(
                node_id = my_id,
                prev_log_index = req.prev_log_index,
                prev_log_term = req.prev_log_term,
                conflict_index,
                "Log consistency check failed"
            );
            return reject(state, conflict_index);
        }
    }

    let match_index = req.prev_log_index + req.entries.len() as u64;
    if !req.entries.is_empty() {
        let entries: Vec<LogEntry> = req.entries.iter().map(LogEntry::from).collect();
        let written = state.merge_entries(req.prev_log_index, entries);

        if written > 0 {
            tracing::debug!(
                node_id = my_id,
                entries_appended = written,
                new_last_index = state.last_log_index(),
                "Appended entries"
            );
        }
    }

    if state.follow_commit_index(req.leader_commit, match_index) {
        tracing::debug!(
            node_id = my_id,
            commit_index = state.commit_index,
            "Follower commit index advanced"
        );
    }

    debug_assert_eq!(state.role, RaftRole::Follower);
    AppendEntriesResponse {
        term: state.current_term,
        success: true,
        match_index,
        conflict_index: 0,
    }
}

fn reject(state: &RaftState, conflict_index: u64) -> AppendEntriesResponse {
    AppendEntriesResponse {
        term: state.current_term,
        success: false,
        match_index: 0,
        conflict_index,
    }
}

impl From<&ProtoLogEntry> for LogEntry {
    fn from(proto: &ProtoLogEntry) -> Self {
        LogEntry {
            term: proto.term,
            index: proto.index,
            command: proto.command.clone(),
        }
    }
}

/// Convert internal LogEntry to protobuf LogEntry
pub fn log_entry_to_proto(entry: &LogEntry) -> ProtoLogEntry {
    ProtoLogEntry {
        term: entry.term,
        index: entry.index,
        command: entry.command.clone(),
    }
}

impl From<StatusReport> for crate::proto::StatusReport {
    fn from(status: StatusReport) -> Self {
        crate::proto::StatusReport {
            index: status.index,
            term: status.term,
            is_leader: status.is_leader,
            call_count: status.call_count,
        }
    }
}

impl From<crate::proto::StatusReport> for StatusReport {
    fn from(status: crate::proto::StatusReport) -> Self {
        StatusReport {
            index: status.index,
            term: status.term,
            is_leader: status.is_leader,
            call_count: status.call_count,
        }
    }
}
