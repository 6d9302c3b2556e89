//! `netspeed keepalive`: hold the keepalive permission until interrupted.
//!
//! While this runs the service may drop its foreground indicator. On exit
//! the service is put back into foreground mode if monitoring is on.

use std::sync::Arc;

use netspeed_config::TomlStore;
use netspeed_core::KeepaliveHost;
use netspeed_core::ipc::SocketTransport;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub async fn run(global: &GlobalOpts) -> Result<(), CliError> {
    let store = Arc::new(TomlStore::at(global.prefs_path()));
    let transport = SocketTransport::new(global.socket_path());
    let host = KeepaliveHost::new(transport, store);

    let cancel = CancellationToken::new();
    super::cancel_on_signal(cancel.clone())?;
    info!("holding keepalive permission");
    host.run(cancel).await;
    Ok(())
}
