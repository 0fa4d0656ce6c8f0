//! parlay-agent - peer-to-peer bilateral betting agent
//!
//! configuration comes from the environment (see config.rs); the cli
//! only overrides the handful of knobs that differ per instance when
//! running several agents on one box.

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use parlay_agent::{Agent, AgentConfig, Role};
use tracing::info;

#[derive(Parser)]
#[command(name = "parlay-agent")]
#[command(about = "peer-to-peer bilateral betting agent")]
#[command(version)]
struct Args {
    /// p2p listen port (overrides P2P_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// agent role (overrides ROLE)
    #[arg(short, long)]
    role: Option<String>,

    /// trade storage directory (overrides TRADE_STORAGE_DIR)
    #[arg(short, long)]
    storage_dir: Option<String>,

    /// metrics port (default: p2p port + 1000)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parlay_agent=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mut config = AgentConfig::from_env().context("loading configuration")?;
    if let Some(port) = args.port {
        config.p2p_port = port;
    }
    if let Some(role) = args.role {
        config.role = role.parse::<Role>().map_err(anyhow::Error::msg)?;
    }
    if let Some(dir) = args.storage_dir {
        config.trade_storage_dir = dir.into();
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = Some(port);
    }

    let metrics_port = config.metrics_port.unwrap_or(config.p2p_port + 1000);
    let metrics_addr: std::net::SocketAddr = format!("{}:{}", config.p2p_bind, metrics_port)
        .parse()
        .context("metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("installing prometheus exporter")?;

    info!("parlay-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("  p2p: {}:{}", config.p2p_bind, config.p2p_port);
    info!("  metrics: {}:{}", config.p2p_bind, metrics_port);
    info!("  storage: {}", config.trade_storage_dir.display());

    let agent = Agent::boot(config).await.context("booting agent")?;
    agent.run().await
}
