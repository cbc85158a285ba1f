//! A minimal admin CLI exercising [`cabinetree::Cluster`] against a
//! running [`cabinetree::server`] node: tree operations plus the
//! configuration/server-info/server-stats surface (spec.md §6.2-§6.3,
//! §10).

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;

use cabinetree::client::client_impl::ClientImpl;
use cabinetree::client::exactly_once::ExactlyOnceRpcHelper;
use cabinetree::client::leader_rpc::LeaderRpc;
use cabinetree::transport::tcp::TcpTransport;
use cabinetree::Cluster;

#[derive(Parser, Debug)]
#[command(name = "cabinctl", about = "Admin CLI for a cabinetree cluster")]
struct Cli {
    /// Comma-separated `host:port` list of cluster members.
    #[arg(long)]
    cluster: String,

    /// Overrides `RUST_LOG`, e.g. "debug".
    #[arg(long)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the contents of a file.
    Read { path: String },
    /// Writes stdin's bytes to a file, creating parent directories none.
    Write { path: String, contents: String },
    /// Lists a directory's immediate children.
    Ls { path: String },
    /// Creates a directory (and any missing parents).
    Mkdir { path: String },
    /// Prints this cluster's current configuration.
    GetConfig,
    /// Prints the contacted server's id and listen address.
    GetServerInfo,
    /// Prints the contacted server's tree statistics.
    GetServerStats,
}

fn init_logging(filter: Option<&str>) {
    let filter = filter.unwrap_or("warn");
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    let transport = Arc::new(TcpTransport::new(Duration::from_secs(5)));
    let leader_rpc = Arc::new(LeaderRpc::new(transport, &cli.cluster, 5254, None));
    let exactly_once =
        ExactlyOnceRpcHelper::new(leader_rpc.clone(), Duration::from_secs(3600), Duration::from_secs(60));
    let backend = ClientImpl::new(leader_rpc, exactly_once);
    let cluster = Cluster::new(backend);

    let result = run(&cluster, cli.command).await;
    cluster.shutdown().await;

    if let Err(e) = result {
        error!(%e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cluster: &Cluster, command: Command) -> Result<(), cabinetree::ClientError> {
    let tree = cluster.tree();
    match command {
        Command::Read { path } => {
            let contents = tree.read(&path).await?;
            std::io::Write::write_all(&mut std::io::stdout(), &contents).ok();
        }
        Command::Write { path, contents } => {
            tree.write(&path, contents.into_bytes()).await?;
        }
        Command::Ls { path } => {
            for child in tree.list_directory(&path).await? {
                println!("{child}");
            }
        }
        Command::Mkdir { path } => {
            tree.make_directory(&path).await?;
        }
        Command::GetConfig => {
            let config = cluster.get_configuration().await?;
            println!("configuration id {}", config.id);
            for server in config.servers {
                println!("  server {} at {}", server.server_id, server.addresses);
            }
        }
        Command::GetServerInfo => {
            let info = cluster.get_server_info().await?;
            println!("server {} at {}", info.server_id, info.addresses);
        }
        Command::GetServerStats => {
            let stats = cluster.get_server_stats().await?;
            println!("server {}", stats.server_id);
            println!("{:#?}", stats.tree);
        }
    }
    Ok(())
}
