// ── Control-socket server ──
//
// Accepts connections on a Unix socket and serves them against a
// `ServiceHost`. A connection is either a sequence of calls or, after a
// `subscribe` frame, a one-way signal stream.

use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::Signal;
use crate::error::{CoreError, RpcError};
use crate::host::ServiceHost;

use super::wire::{self, ClientFrame, MAX_FRAME_LEN, ServerFrame};

/// Owner-only socket.
const SOCKET_MODE: u32 = 0o600;

type Connection = Framed<UnixStream, LinesCodec>;

pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    host: ServiceHost,
}

impl ControlServer {
    /// Bind the socket, replacing a stale one left by a dead daemon.
    pub fn bind(path: impl Into<PathBuf>, host: ServiceHost) -> Result<Self, CoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to bind control socket {}: {e}", path.display()),
            )
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
        info!(path = %path.display(), "control socket listening");

        Ok(Self {
            listener,
            path,
            host,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept until cancelled, then remove the socket file.
    pub async fn serve(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let host = self.host.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(serve_connection(stream, host, cancel));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(error = %e, "control socket already removed");
        }
        info!("control socket closed");
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), CoreError> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            std::fs::remove_file(path)?;
            debug!(path = %path.display(), "removed stale control socket");
            Ok(())
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists but is not a socket", path.display()),
        )
        .into()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Per-connection handling ──────────────────────────────────────

async fn serve_connection(stream: UnixStream, host: ServiceHost, cancel: CancellationToken) {
    let mut conn = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => return,
            line = conn.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!(error = %e, "control connection read failed");
                return;
            }
            None => return,
        };

        let frame = match wire::decode::<ClientFrame>(&line) {
            Ok(ClientFrame::Call { request }) => match host.handle(request).await {
                Ok(reply) => ServerFrame::Reply { reply },
                Err(error) => ServerFrame::Error { error },
            },
            Ok(ClientFrame::Subscribe { keepalive }) => {
                stream_signals(conn, &host, keepalive, cancel).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "undecodable control frame");
                ServerFrame::Error {
                    error: RpcError::from(e),
                }
            }
        };
        if let Err(e) = send(&mut conn, &frame).await {
            debug!(error = %e, "control connection write failed");
            return;
        }
    }
}

/// Forward bus signals until the peer hangs up. A keepalive
/// subscription holds the keepalive permission for as long as it lasts.
async fn stream_signals(
    mut conn: Connection,
    host: &ServiceHost,
    keepalive: bool,
    cancel: CancellationToken,
) {
    let mut signals = host.bus().subscribe(&Signal::ALL);
    let _grant = keepalive.then(|| host.grant_keepalive());
    if send(&mut conn, &ServerFrame::Subscribed).await.is_err() {
        return;
    }
    debug!(keepalive, "signal subscriber attached");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => {
                    if send(&mut conn, &ServerFrame::Signal { signal }).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = conn.next() => match incoming {
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
    debug!(keepalive, "signal subscriber detached");
}

async fn send(conn: &mut Connection, frame: &ServerFrame) -> Result<(), CoreError> {
    let line = wire::encode(frame)?;
    conn.send(line).await.map_err(io::Error::other)?;
    Ok(())
}
