//! `netspeed daemon`: host the indicator service behind the control socket.

use std::sync::Arc;

use netspeed_config::TomlStore;
use netspeed_core::ipc::{ControlServer, SocketTransport};
use netspeed_core::{PreferenceStore, Request, ServiceHost, SysinfoCounter, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{DaemonArgs, GlobalOpts};
use crate::error::CliError;
use crate::indicator::TracingRenderer;

pub async fn run(args: DaemonArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let socket = global.socket_path();
    if SocketTransport::new(&socket).call(Request::Status).await.is_ok() {
        return Err(CliError::DaemonRunning {
            socket: socket.display().to_string(),
        });
    }

    let store = Arc::new(TomlStore::at(global.prefs_path()));
    let host = ServiceHost::new(
        store.clone(),
        SysinfoCounter::factory(),
        Arc::new(TracingRenderer::new()),
    );
    let server = ControlServer::bind(&socket, host.clone())?;
    let cancel = CancellationToken::new();
    let serving = tokio::spawn(server.serve(cancel.clone()));
    info!(prefs = %store.path().display(), "daemon ready");

    let prefs = store.load();
    if !args.no_auto_start && prefs.auto_start && prefs.status {
        info!("auto-starting indicator service");
        if let Err(e) = host.start(store.configuration()).await {
            warn!(error = %e, "auto-start failed");
        }
    }

    super::shutdown_signal()?.await;

    cancel.cancel();
    if let Err(e) = serving.await {
        warn!(error = %e, "control server task failed");
    }
    // Process exit, not a user stop: the status flag survives.
    host.shutdown().await;
    info!("daemon stopped");
    Ok(())
}
