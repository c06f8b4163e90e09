use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::error::RaftError;
use crate::proto::raft_service_server::RaftService;
use crate::proto::{AppendEntriesRequest, AppendEntriesResponse, VoteRequest, VoteResponse};
use crate::raft::RaftNode;

/// gRPC service for peer-to-peer Raft communication
pub struct ClusterService {
    raft_node: Arc<RaftNode>,
}

impl ClusterService {
    pub fn new(raft_node: Arc<RaftNode>) -> Self {
        Self { raft_node }
    }

    fn ensure_active(&self) -> Result<(), Status> {
        if self.raft_node.is_active() {
            Ok(())
        } else {
            Err(RaftError::Inactive.into())
        }
    }
}

#[tonic::async_trait]
impl RaftService for ClusterService {
    async fn request_vote(
        &self,
        request: Request<VoteRequest>,
    ) -> Result<Response<VoteResponse>, Status> {
        self.ensure_active()?;
        let req = request.into_inner();
        let candidate = req.candidate_id;
        let term = req.term;

        let response = self.raft_node.handle_vote_request(req).await;
        tracing::debug!(
            node_id = self.raft_node.id,
            candidate,
            term,
            granted = response.vote_granted,
            "Answered RequestVote"
        );
        Ok(Response::new(response))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        self.ensure_active()?;
        let req = request.into_inner();
        let leader = req.leader_id;
        let entries = req.entries.len();

        let response = self.raft_node.handle_append_entries(req).await;
        if response.success {
            tracing::trace!(node_id = self.raft_node.id, leader, entries, "Accepted AppendEntries");
        } else {
            tracing::debug!(
                node_id = self.raft_node.id,
                leader,
                conflict_index = response.conflict_index,
                "Rejected AppendEntries"
            );
        }
        Ok(Response::new(response))
    }
}
