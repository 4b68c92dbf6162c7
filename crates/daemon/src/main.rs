// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sgd: the SCADA gateway daemon.

use anyhow::Context;
use clap::Parser;
use sg_core::SystemClock;
use sg_daemon::{Gateway, GatewayConfig};
use sg_modbus::TcpTransport;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sgd", about = "SCADA gateway daemon", version)]
struct Args {
    /// Path to the gateway configuration file
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override the configured state directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "sgd.log".into());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_ref());

    let mut config = GatewayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(state_dir) = args.state_dir {
        config.state_dir = state_dir;
    }

    let transport = TcpTransport::new(config.modbus_settings().timeout);
    let mut gateway =
        Gateway::new(config, transport, SystemClock).context("invalid configuration")?;
    gateway.start().await.context("starting gateway")?;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    gateway.shutdown().await;
    Ok(())
}
