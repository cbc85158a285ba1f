//! The server binary: boots a single [`cabinetree::server::ClusterState`]
//! node and serves it over a real loopback/TCP listener.
//!
//! Configuration is split the way the teacher's own `clap`+`serde`+`toml`
//! dependency trio implies: a small set of invocation-time flags on the
//! command line (config path, log-filter override) and everything that
//! describes the cluster's shape in a TOML file next to it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use cabinetree::server::ClusterState;

/// `cabind --config cabind.toml`
#[derive(Parser, Debug)]
#[command(name = "cabind", about = "Single-node cabinetree server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "cabind.toml")]
    config: PathBuf,

    /// Overrides `RUST_LOG`/the config file's `log_filter`, e.g. "debug".
    #[arg(long)]
    log_filter: Option<String>,
}

/// The on-disk shape of `cabind.toml`.
#[derive(Debug, Deserialize)]
struct Config {
    /// This node's unique, non-zero server id (spec.md §3).
    server_id: u64,
    /// A human-readable cluster identity, checked on connection handshake
    /// (spec.md §6.4's "cluster UUID").
    cluster_uuid: String,
    /// `host:port` this node listens on.
    listen_address: SocketAddr,
    /// How long a session may go without a keep-alive before it's
    /// considered expired (spec.md §4.5).
    #[serde(default = "default_session_timeout_secs")]
    session_timeout_secs: u64,
    /// Carried from the original snapshot/log-compaction config even
    /// though this single-node stand-in never compacts (spec.md §1's "the
    /// Raft log itself" is out of scope); kept so a real implementation
    /// dropped in later has somewhere to read it from.
    #[serde(default = "default_snapshot_interval_secs")]
    snapshot_interval_secs: u64,
    #[serde(default)]
    log_filter: Option<String>,
}

fn default_session_timeout_secs() -> u64 {
    60
}

fn default_snapshot_interval_secs() -> u64 {
    3600
}

fn init_logging(filter: Option<&str>) {
    let filter = filter.unwrap_or("info");
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.config).unwrap_or_else(|e| {
        eprintln!("failed to read config file {:?}: {e}", cli.config);
        std::process::exit(1);
    });
    let config: Config = toml::from_str(&raw).unwrap_or_else(|e| {
        eprintln!("failed to parse config file {:?}: {e}", cli.config);
        std::process::exit(1);
    });

    init_logging(cli.log_filter.as_deref().or(config.log_filter.as_deref()));

    info!(
        server_id = config.server_id,
        cluster_uuid = %config.cluster_uuid,
        listen_address = %config.listen_address,
        snapshot_interval_secs = config.snapshot_interval_secs,
        "starting cabind"
    );

    let listener = TcpListener::bind(config.listen_address).await?;
    let state = std::sync::Arc::new(ClusterState::new(
        config.cluster_uuid,
        config.server_id,
        Duration::from_secs(config.session_timeout_secs),
    ));

    cabinetree::server::serve(listener, state).await
}
