use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::raft::RaftNode;

/// How long a deactivating peer waits for open connections to drain
const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Tasks owned by an active peer
struct Running {
    cancel: CancellationToken,
    raft_handle: JoinHandle<()>,
    grpc_handle: JoinHandle<()>,
}

/// A Raft peer with its transport, controlled by the harness.
///
/// The peer starts dormant. `activate` brings up the gRPC server and the
/// timer-driven Raft loop; `deactivate` stops both while leaving every bit
/// of Raft state in place, so a later `activate` simply resumes.
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
    running: Mutex<Option<Running>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let raft_node = Arc::new(RaftNode::new(config.clone()));

        Ok(Self {
            config,
            raft_node,
            running: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.config.node_id
    }

    pub fn is_active(&self) -> bool {
        self.raft_node.is_active()
    }

    /// Start serving RPCs and driving the Raft protocol.
    ///
    /// Returns once the listening socket is bound, so peers can reach this
    /// node as soon as the call completes. Calling it on an active peer is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn activate(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        self.raft_node.connect_to_peers().await?;

        let listen_addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(listen_addr).await?;
        let cancel = CancellationToken::new();

        let server = GrpcServer::new(self.raft_node.clone());
        let server_cancel = cancel.clone();
        let node_id = self.id();
        let grpc_handle = tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_cancel).await {
                tracing::error!(node_id, error = %e, "gRPC server error");
            }
        });

        self.raft_node.resume().await;
        let raft_handle = tokio::spawn(self.raft_node.clone().run(cancel.clone()));

        *running = Some(Running {
            cancel,
            raft_handle,
            grpc_handle,
        });

        tracing::info!(node_id, addr = %listen_addr, "Peer activated");
        Ok(())
    }

    /// Stop serving RPCs and pause the Raft loop.
    ///
    /// Returns once the server has released its socket. Calling it on a
    /// dormant peer is a no-op.
    pub async fn deactivate(&self) {
        let mut running = self.running.lock().await;
        let Some(tasks) = running.take() else {
            return;
        };

        self.raft_node.set_active(false);
        tasks.cancel.cancel();
        let _ = tasks.raft_handle.await;

        let mut grpc_handle = tasks.grpc_handle;
        if timeout(SERVER_SHUTDOWN_GRACE, &mut grpc_handle).await.is_err() {
            tracing::warn!(node_id = self.id(), "gRPC server slow to drain, aborting");
            grpc_handle.abort();
            let _ = grpc_handle.await;
        }

        tracing::info!(node_id = self.id(), "Peer deactivated");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Abort all tasks to ensure clean shutdown
        if let Some(tasks) = self.running.get_mut().take() {
            self.raft_node.set_active(false);
            tasks.cancel.cancel();
            tasks.raft_handle.abort();
            tasks.grpc_handle.abort();
        }
    }
}
