pub mod client;
pub mod config;
pub mod error;
pub mod grpc;
pub mod node;
pub mod proto;
pub mod raft;
pub mod shutdown;
