use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::cluster_service::ClusterService;
use crate::grpc::control_service::ControlServiceImpl;
use crate::proto::control_service_server::ControlServiceServer;
use crate::proto::raft_service_server::RaftServiceServer;
use crate::raft::RaftNode;

pub struct GrpcServer {
    raft_node: Arc<RaftNode>,
}

impl GrpcServer {
    pub fn new(raft_node: Arc<RaftNode>) -> Self {
        Self { raft_node }
    }

    /// Serve both services on an already bound listener until `shutdown`
    /// is cancelled.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        let cluster_service = ClusterService::new(self.raft_node.clone());
        let control_service = ControlServiceImpl::new(self.raft_node.clone());

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(node_id = self.raft_node.id, addr = %addr, "Starting gRPC server");
        }

        Server::builder()
            .add_service(RaftServiceServer::new(cluster_service))
            .add_service(ControlServiceServer::new(control_service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.cancelled().await
            })
            .await
    }
}
