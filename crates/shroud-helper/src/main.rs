//! shroud-helper - privileged peer for one shroud engine
//!
//! Answers `Mount` and `Chroot` requests from an unprivileged engine over a
//! Unix socket, performing the syscalls itself. The supervisor starts one
//! helper per container, sharing the engine's filesystem context (root and
//! working directory) so the chroot takes effect on the engine. The helper
//! exits when its engine disconnects.

use anyhow::Result;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::HelperConfig;
use server::Dispatcher;
use shroud_core::ops::LocalOps;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shroud=info".parse()?))
        .init();

    tracing::info!("shroud-helper starting");

    let config_path = std::env::var_os("SHROUD_HELPER_CONFIG").map(std::path::PathBuf::from);
    let config = HelperConfig::load(config_path.as_deref())?;
    tracing::info!(socket = ?config.socket_path, "configuration loaded");

    // Refuse to serve without the privilege to do the work
    let ops = LocalOps::new()?;
    let dispatcher = Arc::new(Dispatcher::new(ops));

    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Remove a stale socket left by a previous run
    match std::fs::remove_file(&config.socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(&config.socket_path)?;
    std::fs::set_permissions(
        &config.socket_path,
        std::fs::Permissions::from_mode(config.socket_mode),
    )?;
    tracing::info!(socket = ?config.socket_path, "listening");

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    let shutdown = async move {
        if let Some(signal) = signals.next().await {
            tracing::info!(signal, "shutting down");
        }
    };

    let served = server::run(listener, dispatcher, shutdown).await;
    tracing::info!("engine session finished");

    signals_handle.close();

    served
}
