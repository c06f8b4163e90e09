use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::error::RaftError;
use crate::proto::control_service_server::ControlService;
use crate::proto::{
    GetCommittedCmdRequest, GetCommittedCmdResponse, GetStatusRequest, NewCommandRequest,
    StatusReport,
};
use crate::raft::RaftNode;

/// gRPC service used by the harness and clients to inspect the peer and
/// submit commands
pub struct ControlServiceImpl {
    raft_node: Arc<RaftNode>,
}

impl ControlServiceImpl {
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
impl ControlService for ControlServiceImpl {
    async fn get_committed_cmd(
        &self,
        request: Request<GetCommittedCmdRequest>,
    ) -> Result<Response<GetCommittedCmdResponse>, Status> {
        self.ensure_active()?;
        let index = request.into_inner().index;

        let response = match self.raft_node.get_committed_cmd(index).await {
            Some(command) => GetCommittedCmdResponse {
                found: true,
                command,
            },
            None => GetCommittedCmdResponse {
                found: false,
                command: Vec::new(),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_status(
        &self,
        _request: Request<GetStatusRequest>,
    ) -> Result<Response<StatusReport>, Status> {
        self.ensure_active()?;
        let status = self.raft_node.get_status().await;
        Ok(Response::new(status.into()))
    }

    async fn new_command(
        &self,
        request: Request<NewCommandRequest>,
    ) -> Result<Response<StatusReport>, Status> {
        self.ensure_active()?;
        let command = request.into_inner().command;

        match self.raft_node.new_command(command).await {
            Ok(status) => Ok(Response::new(status.into())),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected NewCommand");
                Err(e.into())
            }
        }
    }
}
