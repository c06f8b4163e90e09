use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use raft_peer::client::ControlClient;
use raft_peer::config::NodeConfig;
use raft_peer::error::RaftError;
use raft_peer::node::Node;
use raft_peer::raft::StatusReport;
use raft_peer::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "raft-peer")]
#[command(version)]
#[command(about = "A single peer of a Raft consensus cluster")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a peer until SIGINT or SIGTERM
    Server(ServerArgs),

    /// Show a peer's commit index, term, role and call count
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Submit a command to a peer (must be the leader)
    Submit {
        #[command(flatten)]
        client: ClientArgs,

        /// Command payload, stored as UTF-8 bytes
        command: String,
    },

    /// Read the committed command at a log index
    Get {
        #[command(flatten)]
        client: ClientArgs,

        /// Log index (1-based)
        index: u64,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Peer ID, from 0 to num-1
    #[arg(long, default_value = "0")]
    id: u64,

    /// Number of peers in the cluster
    #[arg(long, default_value = "1")]
    num: u64,

    /// Port of peer 0; peer i listens on base_port + i
    #[arg(long, default_value = "50051")]
    base_port: u16,

    /// Host all peers listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Lower bound of the randomized election timeout
    #[arg(long, default_value = "150")]
    election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout
    #[arg(long, default_value = "300")]
    election_timeout_max_ms: u64,

    /// Leader heartbeat interval
    #[arg(long, default_value = "50")]
    heartbeat_interval_ms: u64,

    /// Timeout for a single peer RPC
    #[arg(long, default_value = "100")]
    rpc_timeout_ms: u64,
}

// =============================================================================
// Client Arguments (shared by status, submit and get)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Peer address
    #[arg(long, short = 'a', default_value = "127.0.0.1:50051")]
    addr: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct StatusOutput {
    index: u64,
    term: u64,
    is_leader: bool,
    call_count: u64,
}

impl From<StatusReport> for StatusOutput {
    fn from(status: StatusReport) -> Self {
        Self {
            index: status.index,
            term: status.term,
            is_leader: status.is_leader,
            call_count: status.call_count,
        }
    }
}

#[derive(Serialize)]
struct CommittedOutput {
    index: u64,
    found: bool,
    command: Option<String>,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig {
        rpc_timeout_ms: args.rpc_timeout_ms,
        ..NodeConfig::new(args.id, args.num, args.base_port)
    }
    .with_host(args.host)
    .with_timeouts(
        args.election_timeout_min_ms,
        args.election_timeout_max_ms,
        args.heartbeat_interval_ms,
    );

    let node = Node::new(config)?;
    let shutdown = install_shutdown_handler()?;

    node.activate().await?;
    shutdown.cancelled().await;
    node.deactivate().await;

    Ok(())
}

// =============================================================================
// Client Commands
// =============================================================================

fn print_status(status: StatusReport, output: &OutputFormat) -> Result<(), serde_json::Error> {
    match output {
        OutputFormat::Json => {
            let output = StatusOutput::from(status);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Index:      {}", status.index);
            println!("Term:       {}", status.term);
            println!("Leader:     {}", status.is_leader);
            println!("Call Count: {}", status.call_count);
        }
    }
    Ok(())
}

async fn handle_status(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&args).await?;
    let status = client.get_status().await?;
    print_status(status, &args.output)?;
    Ok(())
}

async fn handle_submit(args: ClientArgs, command: String) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&args).await?;
    match client.new_command(command.into_bytes()).await {
        Ok(status) => {
            print_status(status, &args.output)?;
            Ok(())
        }
        Err(RaftError::NotLeader(leader)) => {
            let hint = match leader {
                Some(id) => format!("try node {}", id),
                None => "leader unknown".to_string(),
            };
            Err(format!("{} is not the leader ({})", args.addr, hint).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_get(args: ClientArgs, index: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&args).await?;
    let command = client.get_committed_cmd(index).await?;
    let text = command.map(|c| String::from_utf8_lossy(&c).into_owned());

    match args.output {
        OutputFormat::Json => {
            let output = CommittedOutput {
                index,
                found: text.is_some(),
                command: text,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => match text {
            Some(text) => println!("{}: {}", index, text),
            None => println!("{}: <not committed>", index),
        },
    }
    Ok(())
}

async fn connect(args: &ClientArgs) -> Result<ControlClient, RaftError> {
    ControlClient::connect(&args.addr, Duration::from_millis(args.timeout_ms)).await
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Status { client } => handle_status(client).await?,
        Commands::Submit { client, command } => handle_submit(client, command).await?,
        Commands::Get { client, index } => handle_get(client, index).await?,
    }

    Ok(())
}
