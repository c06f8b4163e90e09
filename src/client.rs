use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};

use crate::error::Result;
use crate::proto::control_service_client::ControlServiceClient;
use crate::proto::{GetCommittedCmdRequest, GetStatusRequest, NewCommandRequest};
use crate::raft::StatusReport;

/// Client for the harness-facing operations of a single peer
#[derive(Clone)]
pub struct ControlClient {
    inner: ControlServiceClient<Channel>,
}

impl ControlClient {
    /// Connect to a peer at `addr` (host:port, with or without scheme)
    pub async fn connect(addr: &str, request_timeout: Duration) -> Result<Self> {
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };

        let channel = Endpoint::from_shared(uri)?
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .connect()
            .await?;

        Ok(Self {
            inner: ControlServiceClient::new(channel),
        })
    }

    pub async fn get_status(&mut self) -> Result<StatusReport> {
        let response = self.inner.get_status(GetStatusRequest {}).await?;
        Ok(response.into_inner().into())
    }

    /// Committed command at `index`, `None` if nothing is committed there
    pub async fn get_committed_cmd(&mut self, index: u64) -> Result<Option<Vec<u8>>> {
        let response = self
            .inner
            .get_committed_cmd(GetCommittedCmdRequest { index })
            .await?
            .into_inner();
        Ok(response.found.then_some(response.command))
    }

    /// Submit a command; fails with `RaftError::NotLeader` on a follower
    pub async fn new_command(&mut self, command: Vec<u8>) -> Result<StatusReport> {
        let response = self
            .inner
            .new_command(NewCommandRequest { command })
            .await?;
        Ok(response.into_inner().into())
    }
}
