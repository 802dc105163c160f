pub mod background;
pub mod bootstrap;
pub mod context;
pub mod server;

use std::path::PathBuf;

use clap::Parser;
use context::AppContext;
use mesh_crypto::CertificateBundle;

/// meshrun — a single node in a peer-to-peer cluster runtime. Role
/// (coordinator or worker) and every other tunable come from the config
/// file; these flags only override it for local experimentation.
#[derive(Parser, Debug)]
#[command(name = "meshrun", version, about)]
pub struct Cli {
    /// Path to the node's YAML config file.
    #[arg(long, default_value = "meshrun.yaml")]
    pub config: PathBuf,

    /// Overrides `node_id` from the config file.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Overrides `port` from the config file.
    #[arg(long)]
    pub port: Option<u16>,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = mesh_config::Config::load(&cli.config)?;
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let bind_address = config.bind_address.clone();
    let port = config.port;
    let certs_dir = config.certs_dir();
    let cleanup_interval_secs = config.cleanup_interval;
    let adjust_interval_period_secs = config.adjust_interval_period;
    let coordinator_addresses = config.coordinator_addresses.clone();
    let role_label = config.role_label();

    let ctx = AppContext::bootstrap(config).await?;
    tracing::info!(node_id = %ctx.node_id, role = role_label, "meshrun starting");

    ctx.lifecycle.start_all().await?;

    if !ctx.config.coordinator_mode {
        if let Err(err) = ctx.gossip.join(&coordinator_addresses).await {
            tracing::warn!(error = %err, "initial cluster join failed, will retry on the next gossip round");
        }
    }

    let leaf = CertificateBundle::load_leaf(&certs_dir)?;
    let http_server = server::bind(&bind_address, port, &leaf, ctx.rpc_state())?;
    let server_handle = http_server.handle();
    let server_task = actix_web::rt::spawn(http_server);

    let background = background::BackgroundTasks::spawn(
        ctx.gossip.clone(),
        ctx.tokens.clone(),
        cleanup_interval_secs,
        adjust_interval_period_secs,
    );

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");

    server_handle.stop(true).await;
    let _ = server_task.await;
    background.stop().await;
    ctx.lifecycle.shutdown_all().await;

    tracing::info!("meshrun stopped cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
