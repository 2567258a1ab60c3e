use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use aosgate::config::GatewayConfig;
use aosgate::gate::CommandGate;
use aosgate::http::{self, AppState};
use aosgate::inventory::Inventory;
use aosgate::session::{reaper, SessionPool, DEFAULT_IDLE_TIMEOUT, DEFAULT_REAP_INTERVAL};

/// AOS SSH gateway: pooled SSH sessions behind an HTTP/JSON API.
#[derive(Parser, Debug)]
#[command(name = "aosgate", version)]
struct Cli {
    /// HTTP listen port.
    #[arg(long, env = "ALE_AOS_SSH_PORT", default_value_t = 8110)]
    port: u16,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "ALE_AOS_SSH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// YAML file with the command allow-list.
    #[arg(
        long = "aos-ssh-conf-file",
        env = "ALE_AOS_SSH_CONF_FILE",
        default_value = "data/aos-ssh-conf.yaml"
    )]
    conf_file: PathBuf,

    /// JSON inventory of jump hosts and devices.
    #[arg(
        long = "aos-ssh-host-file",
        env = "ALE_AOS_SSH_HOST_FILE",
        default_value = "data/aos-ssh-host.json"
    )]
    host_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .init();

    info!(
        "starting gateway: port {}, conf-file {}, host-file {}",
        cli.port,
        cli.conf_file.display(),
        cli.host_file.display()
    );

    let config = GatewayConfig::load(&cli.conf_file)?;
    info!("allowed commands: {:?}", config.allowed_aos_commands);
    let gate = CommandGate::new(&config.allowed_aos_commands)?;
    let inventory = Inventory::load(&cli.host_file)?;

    let pool = Arc::new(SessionPool::new(DEFAULT_IDLE_TIMEOUT));
    let reaper_task = reaper::spawn(pool.clone(), DEFAULT_REAP_INTERVAL);

    let state = AppState {
        inventory: Arc::new(inventory),
        pool: pool.clone(),
        gate: Arc::new(gate),
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("cannot bind port {}", cli.port))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    reaper_task.abort();
    pool.close_all().await;
    info!("all sessions closed, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
