//! Subcommand handlers.

pub mod config_cmd;
pub mod control;
pub mod daemon;
pub mod keepalive;

use std::future::Future;
use std::sync::Arc;

use netspeed_config::TomlStore;
use netspeed_core::ServiceController;
use netspeed_core::ipc::SocketTransport;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::GlobalOpts;

/// A controller talking to the daemon, with the preference file as its
/// store.
pub(crate) fn connect(global: &GlobalOpts) -> (ServiceController<SocketTransport>, Arc<TomlStore>) {
    let store = Arc::new(TomlStore::at(global.prefs_path()));
    let transport = SocketTransport::new(global.socket_path());
    (ServiceController::new(transport, store.clone()), store)
}

/// Resolves on SIGINT or SIGTERM.
pub(crate) fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    })
}

/// Cancel `token` once a shutdown signal arrives.
pub(crate) fn cancel_on_signal(token: CancellationToken) -> std::io::Result<()> {
    let signal = shutdown_signal()?;
    tokio::spawn(async move {
        signal.await;
        token.cancel();
    });
    Ok(())
}
