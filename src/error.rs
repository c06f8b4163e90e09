use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Not the leader, last known leader is node {0:?}")]
    NotLeader(Option<u64>),

    #[error("Peer is not active")]
    Inactive,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("gRPC error: {0}")]
    Rpc(tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RaftError>;

/// Metadata key carrying the known leader id on NotLeader failures
const LEADER_HINT_KEY: &str = "x-raft-leader";

impl From<RaftError> for tonic::Status {
    fn from(err: RaftError) -> Self {
        match err {
            RaftError::NotLeader(leader) => {
                let mut status = tonic::Status::failed_precondition(err.to_string());
                if let Some(id) = leader {
                    if let Ok(value) = id.to_string().parse() {
                        status.metadata_mut().insert(LEADER_HINT_KEY, value);
                    }
                }
                status
            }
            RaftError::Inactive => tonic::Status::unavailable(err.to_string()),
            RaftError::InvalidConfig(_) => tonic::Status::invalid_argument(err.to_string()),
            RaftError::Rpc(status) => status,
            RaftError::Transport(_) | RaftError::Io(_) => tonic::Status::internal(err.to_string()),
        }
    }
}

impl From<tonic::Status> for RaftError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::FailedPrecondition => {
                let leader = status
                    .metadata()
                    .get(LEADER_HINT_KEY)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());
                RaftError::NotLeader(leader)
            }
            _ => RaftError::Rpc(status),
        }
    }
}
