use std::collections::{HashMap, HashSet};

use tokio::time::{Duration, Instant};

/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// A single entry in the Raft log. Indices start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub command: Vec<u8>,
}

/// Snapshot reported to the harness by GetStatus and NewCommand.
///
/// `index` is the commit index for GetStatus and the index assigned to the
/// new entry for NewCommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub index: u64,
    pub term: u64,
    pub is_leader: bool,
    pub call_count: u64,
}

/// All mutable state of a peer, guarded as one unit by the node's lock.
///
/// # Safety properties
///
/// - One vote per term: `voted_for` is cleared only when the term advances,
///   and winning needs a strict majority of tallied votes.
/// - A leader only appends (`append_entry`). Truncation lives in
///   `merge_entries` and runs only when a follower sees a conflicting entry.
/// - Logs that share an entry's index and term share the whole prefix up to
///   it, because AppendEntries is accepted only when `(prev_log_index,
///   prev_log_term)` matches and conflicting suffixes are dropped first.
/// - A vote goes only to a candidate whose log `is_log_up_to_date`, and
///   `advance_commit_index` only counts replicas of current-term entries.
/// - `take_committed_entries` never passes `commit_index`, which never moves
///   backwards.
#[derive(Debug)]
pub struct RaftState {
    // Persistent state (kept in memory only)
    pub current_term: u64,
    pub voted_for: Option<u64>,
    pub log: Vec<LogEntry>,

    // Volatile state on all servers
    pub commit_index: u64,
    pub last_applied: u64,

    // Volatile state on leaders (reinitialized after every election win)
    pub next_index: HashMap<u64, u64>,
    pub match_index: HashMap<u64, u64>,

    pub role: RaftRole,
    pub leader_id: Option<u64>,

    // Voters in the current election (for candidates)
    pub votes_received: HashSet<u64>,

    // Client commands accepted while leader
    pub call_count: u64,

    // Election timer
    pub last_contact: Instant,
    pub election_timeout: Duration,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            commit_index: 0,
            last_applied: 0,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            role: RaftRole::Follower,
            leader_id: None,
            votes_received: HashSet::new(),
            call_count: 0,
            last_contact: Instant::now(),
            election_timeout: Duration::from_millis(300),
        }
    }

    /// Get the last log index
    pub fn last_log_index(&self) -> u64 {
        self.log.last().map(|e| e.index).unwrap_or(0)
    }

    /// Get the last log term
    pub fn last_log_term(&self) -> u64 {
        self.log.last().map(|e| e.term).unwrap_or(0)
    }

    /// Get log entry at index (1-indexed)
    pub fn get_entry(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.log.get((index - 1) as usize)
    }

    /// Term of the entry at `index`; index 0 is the empty prefix with term 0
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.get_entry(index).map(|e| e.term)
    }

    /// Get entries starting from index (inclusive)
    pub fn get_entries_from(&self, start_index: u64) -> Vec<LogEntry> {
        let start = start_index.saturating_sub(1) as usize;
        if start >= self.log.len() {
            return Vec::new();
        }
        self.log[start..].to_vec()
    }

    /// Append a new entry in the current term and return it
    pub fn append_entry(&mut self, command: Vec<u8>) -> &LogEntry {
        let index = self.last_log_index() + 1;
        self.log.push(LogEntry {
            term: self.current_term,
            index,
            command,
        });
        &self.log[self.log.len() - 1]
    }

    /// Merge entries sent by a leader after `prev_log_index`.
    ///
    /// Entries already present with the same term are kept; at the first
    /// conflict the suffix is truncated and the remaining entries appended.
    /// Returns the number of entries written.
    pub fn merge_entries(&mut self, prev_log_index: u64, entries: Vec<LogEntry>) -> usize {
        let mut written = 0;
        for (offset, mut entry) in entries.into_iter().enumerate() {
            let index = prev_log_index + 1 + offset as u64;
            match self.term_at(index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    tracing::debug!(
                        index,
                        truncated = self.last_log_index() - index + 1,
                        "Truncating conflicting log suffix"
                    );
                    self.log.truncate((index - 1) as usize);
                }
                None => {}
            }
            entry.index = index;
            self.log.push(entry);
            written += 1;
        }
        written
    }

    /// Index the leader should probe next after a failed consistency check
    /// at `prev_log_index`.
    ///
    /// Points one past our last entry when our log is too short, otherwise at
    /// the first entry of the conflicting term.
    pub fn conflict_index(&self, prev_log_index: u64) -> u64 {
        match self.term_at(prev_log_index) {
            None => self.last_log_index() + 1,
            Some(term) => {
                let mut index = prev_log_index;
                while index > 1 && self.term_at(index - 1) == Some(term) {
                    index -= 1;
                }
                index.max(1)
            }
        }
    }

    /// Check if candidate's log is at least as up-to-date as ours
    pub fn is_log_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_last_term = self.last_log_term();
        let our_last_index = self.last_log_index();

        // Candidate's log is up-to-date if:
        // 1. Their last term is greater, OR
        // 2. Terms are equal and their index is >= ours
        last_log_term > our_last_term
            || (last_log_term == our_last_term && last_log_index >= our_last_index)
    }

    /// Transition to follower state, adopting `term` if it is newer
    pub fn become_follower(&mut self, term: u64) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        self.role = RaftRole::Follower;
        self.votes_received.clear();
    }

    /// Transition to candidate state
    pub fn become_candidate(&mut self, my_id: u64) {
        self.role = RaftRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(my_id);
        self.votes_received.clear();
        self.votes_received.insert(my_id); // Vote for self
        self.leader_id = None;
    }

    /// Transition to leader state
    pub fn become_leader(&mut self, my_id: u64, peer_ids: &[u64]) {
        self.role = RaftRole::Leader;
        self.leader_id = Some(my_id);
        self.votes_received.clear();

        // Initialize next_index and match_index for all peers
        let last_log_index = self.last_log_index();
        self.next_index.clear();
        self.match_index.clear();
        for &peer_id in peer_ids {
            self.next_index.insert(peer_id, last_log_index + 1);
            self.match_index.insert(peer_id, 0);
        }
    }

    /// Record a granted vote and return the number of distinct voters
    pub fn record_vote(&mut self, voter: u64) -> u64 {
        self.votes_received.insert(voter);
        self.votes_received.len() as u64
    }

    /// Restart the election timer with a fresh timeout
    pub fn reset_election_timer(&mut self, timeout: Duration) {
        self.last_contact = Instant::now();
        self.election_timeout = timeout;
    }

    pub fn election_deadline(&self) -> Instant {
        self.last_contact + self.election_timeout
    }

    /// Advance the commit index on a leader.
    ///
    /// Picks the highest index from the current term stored on at least
    /// `quorum` peers (the leader included). Returns true if it moved.
    pub fn advance_commit_index(&mut self, quorum: u64) -> bool {
        if self.role != RaftRole::Leader {
            return false;
        }

        let mut candidate = self.last_log_index();
        while candidate > self.commit_index {
            match self.term_at(candidate) {
                Some(term) if term == self.current_term => {
                    let replicas = 1 + self
                        .match_index
                        .values()
                        .filter(|&&m| m >= candidate)
                        .count() as u64;
                    if replicas >= quorum {
                        self.commit_index = candidate;
                        return true;
                    }
                }
                // Terms never increase going backwards, so nothing older
                // can be committed by counting
                _ => return false,
            }
            candidate -= 1;
        }
        false
    }

    /// Raise the commit index on a follower, never past `last_new_index`
    pub fn follow_commit_index(&mut self, leader_commit: u64, last_new_index: u64) -> bool {
        let target = leader_commit.min(last_new_index);
        if target > self.commit_index {
            self.commit_index = target;
            return true;
        }
        false
    }

    /// Command stored at `index` if that entry is committed
    pub fn committed_command(&self, index: u64) -> Option<&[u8]> {
        if index == 0 || index > self.commit_index {
            return None;
        }
        self.get_entry(index).map(|e| e.command.as_slice())
    }

    /// Hand out committed entries not yet applied, advancing `last_applied`
    pub fn take_committed_entries(&mut self) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            if let Some(entry) = self.get_entry(self.last_applied) {
                entries.push(entry.clone());
            }
        }
        entries
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            index: self.commit_index,
            term: self.current_term,
            is_leader: self.role == RaftRole::Leader,
            call_count: self.call_count,
        }
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: u64, index: u64) -> LogEntry {
        LogEntry {
            term,
            index,
            command: vec![index as u8],
        }
    }

    fn state_with_terms(terms: &[u64]) -> RaftState {
        let mut state = RaftState::new();
        for &term in terms {
            state.current_term = term;
            state.append_entry(vec![]);
        }
        state
    }

    #[test]
    fn test_new_state_is_follower() {
        let state = RaftState::new();
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 0);
        assert_eq!(state.voted_for, None);
        assert!(state.log.is_empty());
        assert_eq!(state.commit_index, 0);
        assert_eq!(state.call_count, 0);
    }

    #[test]
    fn test_become_candidate() {
        let mut state = RaftState::new();
        state.leader_id = Some(4);
        state.become_candidate(1);

        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, 1);
        assert_eq!(state.voted_for, Some(1));
        assert_eq!(state.votes_received.len(), 1);
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_become_leader() {
        let mut state = state_with_terms(&[1, 1]);
        state.become_candidate(1);
        state.become_leader(1, &[2, 3]);

        assert_eq!(state.role, RaftRole::Leader);
        assert_eq!(state.leader_id, Some(1));
        assert_eq!(state.next_index.get(&2), Some(&3));
        assert_eq!(state.next_index.get(&3), Some(&3));
        assert_eq!(state.match_index.get(&2), Some(&0));
        assert_eq!(state.match_index.get(&3), Some(&0));
    }

    #[test]
    fn test_become_follower_higher_term_resets_vote() {
        let mut state = RaftState::new();
        state.become_candidate(1);
        state.become_follower(5);

        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 5);
        assert_eq!(state.voted_for, None);
        assert!(state.votes_received.is_empty());
    }

    #[test]
    fn test_become_follower_same_term_keeps_vote() {
        let mut state = RaftState::new();
        state.become_candidate(1);
        state.become_follower(1);

        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 1);
        assert_eq!(state.voted_for, Some(1));
    }

    #[test]
    fn test_become_follower_never_lowers_term() {
        let mut state = RaftState::new();
        state.current_term = 7;
        state.become_follower(3);
        assert_eq!(state.current_term, 7);
    }

    #[test]
    fn test_record_vote_counts_distinct_voters() {
        let mut state = RaftState::new();
        state.become_candidate(1);
        assert_eq!(state.record_vote(2), 2);
        assert_eq!(state.record_vote(2), 2);
        assert_eq!(state.record_vote(3), 3);
    }

    #[test]
    fn test_append_entry() {
        let mut state = RaftState::new();
        state.current_term = 1;

        let entry = state.append_entry(b"a".to_vec());
        assert_eq!(entry.term, 1);
        assert_eq!(entry.index, 1);

        state.current_term = 2;
        let entry2 = state.append_entry(b"b".to_vec());
        assert_eq!(entry2.term, 2);
        assert_eq!(entry2.index, 2);

        assert_eq!(state.last_log_index(), 2);
        assert_eq!(state.last_log_term(), 2);
    }

    #[test]
    fn test_get_entry_and_term_at() {
        let state = state_with_terms(&[1, 2]);

        assert!(state.get_entry(0).is_none());
        assert_eq!(state.get_entry(1).unwrap().term, 1);
        assert_eq!(state.get_entry(2).unwrap().term, 2);
        assert!(state.get_entry(3).is_none());

        assert_eq!(state.term_at(0), Some(0));
        assert_eq!(state.term_at(2), Some(2));
        assert_eq!(state.term_at(3), None);
    }

    #[test]
    fn test_get_entries_from() {
        let state = state_with_terms(&[1, 2, 3]);

        let entries = state.get_entries_from(2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 2);
        assert_eq!(entries[1].index, 3);

        assert_eq!(state.get_entries_from(0).len(), 3);
        assert_eq!(state.get_entries_from(1).len(), 3);
        assert!(state.get_entries_from(10).is_empty());
    }

    #[test]
    fn test_merge_entries_truncates_conflict() {
        let mut state = state_with_terms(&[1, 1, 1]);

        let written = state.merge_entries(1, vec![entry(2, 2), entry(2, 3)]);

        assert_eq!(written, 2);
        assert_eq!(state.log.len(), 3);
        assert_eq!(state.log[0].term, 1);
        assert_eq!(state.log[1].term, 2);
        assert_eq!(state.log[2].term, 2);
    }

    #[test]
    fn test_merge_entries_keeps_matching_suffix() {
        let mut state = state_with_terms(&[1, 1, 1, 1]);

        // A stale request covering only index 2 must not drop 3 and 4
        let existing = state.log[1].clone();
        let written = state.merge_entries(1, vec![existing]);

        assert_eq!(written, 0);
        assert_eq!(state.log.len(), 4);
    }

    #[test]
    fn test_merge_entries_appends_past_end() {
        let mut state = state_with_terms(&[1]);
        let written = state.merge_entries(1, vec![entry(1, 2), entry(1, 3)]);
        assert_eq!(written, 2);
        assert_eq!(state.last_log_index(), 3);
    }

    #[test]
    fn test_conflict_index() {
        let state = state_with_terms(&[1, 2, 2, 2]);

        // Log too short: probe one past our end
        assert_eq!(state.conflict_index(9), 5);
        // Term mismatch at 4: skip back to the first index of term 2
        assert_eq!(state.conflict_index(4), 2);
        assert_eq!(state.conflict_index(1), 1);
    }

    #[test]
    fn test_is_log_up_to_date() {
        let mut state = RaftState::new();

        // Empty log - any log is up-to-date
        assert!(state.is_log_up_to_date(0, 0));
        assert!(state.is_log_up_to_date(1, 1));

        state.current_term = 1;
        state.append_entry(vec![]);
        state.current_term = 2;
        state.append_entry(vec![]);

        // Higher term is always up-to-date
        assert!(state.is_log_up_to_date(1, 3));

        // Same term, same or higher index is up-to-date
        assert!(state.is_log_up_to_date(2, 2));
        assert!(state.is_log_up_to_date(3, 2));

        // Lower term is never up-to-date
        assert!(!state.is_log_up_to_date(5, 1));

        // Same term, lower index is not up-to-date
        assert!(!state.is_log_up_to_date(1, 2));
    }

    #[test]
    fn test_advance_commit_index_majority() {
        let mut state = state_with_terms(&[1, 1, 1]);
        state.become_leader(0, &[1, 2, 3, 4]);

        state.match_index.insert(1, 2);
        assert!(!state.advance_commit_index(3));
        assert_eq!(state.commit_index, 0);

        state.match_index.insert(2, 3);
        assert!(state.advance_commit_index(3));
        assert_eq!(state.commit_index, 2);

        state.match_index.insert(1, 3);
        assert!(state.advance_commit_index(3));
        assert_eq!(state.commit_index, 3);
    }

    #[test]
    fn test_advance_commit_index_skips_previous_terms() {
        // Entries 1-2 from term 1, leader now in term 3 with no entry of its own
        let mut state = state_with_terms(&[1, 1]);
        state.current_term = 3;
        state.become_leader(0, &[1, 2]);
        state.match_index.insert(1, 2);
        state.match_index.insert(2, 2);

        assert!(!state.advance_commit_index(2));
        assert_eq!(state.commit_index, 0);

        // Once a current-term entry replicates, older ones commit with it
        state.append_entry(vec![]);
        state.match_index.insert(1, 3);
        assert!(state.advance_commit_index(2));
        assert_eq!(state.commit_index, 3);
    }

    #[test]
    fn test_advance_commit_index_requires_leader() {
        let mut state = state_with_terms(&[1]);
        assert!(!state.advance_commit_index(1));
    }

    #[test]
    fn test_single_node_commits_alone() {
        let mut state = RaftState::new();
        state.become_candidate(0);
        state.become_leader(0, &[]);
        state.append_entry(b"x".to_vec());
        assert!(state.advance_commit_index(1));
        assert_eq!(state.commit_index, 1);
    }

    #[test]
    fn test_follow_commit_index_is_monotonic() {
        let mut state = state_with_terms(&[1, 1, 1]);
        assert!(state.follow_commit_index(5, 2));
        assert_eq!(state.commit_index, 2);
        assert!(!state.follow_commit_index(1, 3));
        assert_eq!(state.commit_index, 2);
    }

    #[test]
    fn test_committed_command() {
        let mut state = RaftState::new();
        state.current_term = 1;
        state.append_entry(b"a".to_vec());
        state.append_entry(b"b".to_vec());
        state.commit_index = 1;

        assert_eq!(state.committed_command(0), None);
        assert_eq!(state.committed_command(1), Some(&b"a"[..]));
        assert_eq!(state.committed_command(2), None);
        assert_eq!(state.committed_command(99), None);
    }

    #[test]
    fn test_take_committed_entries() {
        let mut state = state_with_terms(&[1, 1, 1]);
        state.commit_index = 2;

        let applied = state.take_committed_entries();
        assert_eq!(applied.len(), 2);
        assert_eq!(state.last_applied, 2);
        assert!(state.take_committed_entries().is_empty());

        state.commit_index = 3;
        let applied = state.take_committed_entries();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].index, 3);
    }

    #[test]
    fn test_status() {
        let mut state = state_with_terms(&[2, 2]);
        state.commit_index = 1;
        state.call_count = 2;
        state.become_leader(0, &[1]);

        let status = state.status();
        assert_eq!(status.index, 1);
        assert_eq!(status.term, 2);
        assert!(status.is_leader);
        assert_eq!(status.call_count, 2);
    }

    #[test]
    fn test_state_transitions() {
        let mut state = RaftState::new();
        assert_eq!(state.role, RaftRole::Follower);

        state.become_candidate(1);
        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, 1);

        state.record_vote(2);
        state.become_leader(1, &[2, 3]);
        assert_eq!(state.role, RaftRole::Leader);

        // Discover higher term
        state.become_follower(5);
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 5);
    }
}
