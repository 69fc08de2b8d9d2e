use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use clawmesh_identity::{Identity, TrustStore};
use clawmesh_mesh::ForwardSink;
use clawmesh_node::{find_config_path, load_config, Config, Node};

#[derive(Parser)]
#[command(name = "clawmesh", about = "Mesh-first gateway fabric node")]
struct Cli {
    /// Directory holding this node's identity key and trust store.
    #[arg(long, env = "CLAWMESH_STATE_DIR", default_value = "./clawmesh-state")]
    state_dir: PathBuf,

    /// Path to clawmesh.yaml. Defaults to ./clawmesh.yaml, then the XDG
    /// config directory.
    #[arg(long, env = "CLAWMESH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on for peer WebSocket connections.
    #[arg(long, env = "CLAWMESH_BIND", default_value = "0.0.0.0:7420")]
    bind: SocketAddr,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// No domain channel is wired by default: a bare `clawmesh` binary has
/// nothing to actually deliver a forwarded message to. Hosts embedding this
/// crate provide a real `ForwardSink`.
struct UnconfiguredSink;

#[async_trait::async_trait]
impl ForwardSink for UnconfiguredSink {
    async fn deliver(
        &self,
        payload: &clawmesh_proto::ForwardPayload,
    ) -> Result<String, String> {
        tracing::warn!(channel = %payload.channel, to = %payload.to, "no forward sink configured; dropping");
        Err("no forward sink configured for this node".into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("creating state dir {}", cli.state_dir.display()))?;

    let identity = Identity::load_or_create(&cli.state_dir.join("identity.json"))
        .context("loading device identity")?;
    let trust_store = TrustStore::load(&cli.state_dir.join("trusted-peers.json"))
        .context("loading trust store")?;

    let config_path = cli.config.or_else(find_config_path);
    let config = match config_path {
        Some(path) => load_config(&path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(device_id = %identity.device_id(), "starting clawmesh node");

    let node = Arc::new(Node::new(Arc::new(identity), trust_store, config));
    node.clone()
        .start(
            cli.bind,
            Arc::new(UnconfiguredSink),
            Default::default(),
            None,
        )
        .await
        .context("starting node")?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    node.stop().await;
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
