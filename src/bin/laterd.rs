//! The later daemon binary.
//!
//! Listens on the per-user control socket, fires due tasks, and drains
//! gracefully on SIGINT/SIGTERM. Diagnostic output goes to stderr.

use clap::Parser;
use later::DaemonConfig;
use later::server;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Deferred one-shot shell command daemon.
#[derive(Parser)]
#[command(name = "laterd", version, about)]
struct Cli {
    /// Unix socket path to listen on (defaults to the per-user runtime dir).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("later=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = if let Some(ref path) = cli.config {
        DaemonConfig::from_file(path)?
    } else {
        DaemonConfig::default()
    };
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    info!("laterd v{} starting", env!("CARGO_PKG_VERSION"));
    server::run(config, cancel).await?;
    info!("laterd shut down cleanly");
    Ok(())
}

/// Cancel the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
        }
        cancel.cancel();
    });
}
