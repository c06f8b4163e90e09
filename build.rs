use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{}", input))
        .output_type(format!("crate::proto::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    // Peer-to-peer consensus RPCs
    let raft_service = Service::builder()
        .name("RaftService")
        .package("raft")
        .method(method(
            "request_vote",
            "RequestVote",
            "VoteRequest",
            "VoteResponse",
        ))
        .method(method(
            "append_entries",
            "AppendEntries",
            "AppendEntriesRequest",
            "AppendEntriesResponse",
        ))
        .build();

    // Harness / client facing operations
    let control_service = Service::builder()
        .name("ControlService")
        .package("raft")
        .method(method(
            "get_committed_cmd",
            "GetCommittedCmd",
            "GetCommittedCmdRequest",
            "GetCommittedCmdResponse",
        ))
        .method(method(
            "get_status",
            "GetStatus",
            "GetStatusRequest",
            "StatusReport",
        ))
        .method(method(
            "new_command",
            "NewCommand",
            "NewCommandRequest",
            "StatusReport",
        ))
        .build();

    Builder::new().compile(&[raft_service, control_service]);
}
