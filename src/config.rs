use std::net::SocketAddr;

use crate::error::{RaftError, Result};

/// Configuration for a single Raft peer.
///
/// Peers are numbered `0..peer_count` and listen on consecutive ports starting
/// at `base_port`, so any peer can derive every other peer's address from
/// `(node_id, peer_count, base_port)` alone.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u64,
    pub peer_count: u64,
    pub host: String,
    pub base_port: u16,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound for a single outbound RPC, including connection setup
    pub rpc_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            peer_count: 1,
            host: "127.0.0.1".to_string(),
            base_port: 50051,
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            rpc_timeout_ms: 100,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: u64, peer_count: u64, base_port: u16) -> Self {
        Self {
            node_id,
            peer_count,
            base_port,
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeouts(
        mut self,
        election_timeout_min_ms: u64,
        election_timeout_max_ms: u64,
        heartbeat_interval_ms: u64,
    ) -> Self {
        self.election_timeout_min_ms = election_timeout_min_ms;
        self.election_timeout_max_ms = election_timeout_max_ms;
        self.heartbeat_interval_ms = heartbeat_interval_ms;
        self
    }

    /// Check that the configuration describes a usable peer.
    pub fn validate(&self) -> Result<()> {
        if self.peer_count == 0 {
            return Err(RaftError::InvalidConfig(
                "peer_count must be at least 1".to_string(),
            ));
        }
        if self.node_id >= self.peer_count {
            return Err(RaftError::InvalidConfig(format!(
                "node_id {} out of range for {} peers",
                self.node_id, self.peer_count
            )));
        }
        if self.election_timeout_min_ms == 0
            || self.election_timeout_min_ms > self.election_timeout_max_ms
        {
            return Err(RaftError::InvalidConfig(format!(
                "invalid election timeout range {}..={}ms",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms >= self.election_timeout_min_ms
        {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat interval {}ms must be below the minimum election timeout {}ms",
                self.heartbeat_interval_ms, self.election_timeout_min_ms
            )));
        }
        if self.base_port as u64 + self.peer_count - 1 > u16::MAX as u64 {
            return Err(RaftError::InvalidConfig(format!(
                "{} peers starting at port {} overflow the port range",
                self.peer_count, self.base_port
            )));
        }
        Ok(())
    }

    /// Port assigned to a peer, `None` if it would overflow
    pub fn peer_port(&self, node_id: u64) -> Option<u16> {
        u16::try_from(self.base_port as u64 + node_id).ok()
    }

    /// Address of a peer in host:port format
    pub fn peer_addr(&self, node_id: u64) -> String {
        let port = self.peer_port(node_id).unwrap_or(0);
        format!("{}:{}", self.host, port)
    }

    /// Socket address this peer listens on
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.peer_addr(self.node_id)
            .parse()
            .map_err(|e| RaftError::InvalidConfig(format!("invalid listen address: {}", e)))
    }

    /// IDs of every other peer in the cluster
    pub fn peer_ids(&self) -> Vec<u64> {
        (0..self.peer_count)
            .filter(|&id| id != self.node_id)
            .collect()
    }

    /// Strict majority of the cluster size
    pub fn quorum(&self) -> u64 {
        self.peer_count / 2 + 1
    }
}
