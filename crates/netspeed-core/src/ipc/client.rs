use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, trace};

use crate::error::RpcError;
use crate::rpc::{Reply, Request, SignalReceiver, Transport};

use super::wire::{self, ClientFrame, MAX_FRAME_LEN, ServerFrame};

/// Upper bound for connect + one request/reply exchange.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

const SIGNAL_BUFFER: usize = 16;

type Connection = Framed<UnixStream, LinesCodec>;

/// Transport over the daemon's control socket. One connection per call;
/// one long-lived connection per subscription.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    path: Arc<PathBuf>,
}

impl SocketTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<Connection, RpcError> {
        let stream = UnixStream::connect(self.path.as_path())
            .await
            .map_err(|e| RpcError::unreachable(format!("{}: {e}", self.path.display())))?;
        Ok(Framed::new(
            stream,
            LinesCodec::new_with_max_length(MAX_FRAME_LEN),
        ))
    }

    async fn exchange(&self, frame: &ClientFrame) -> Result<(Connection, ServerFrame), RpcError> {
        let mut conn = self.connect().await?;
        let line = wire::encode(frame)?;
        conn.send(line)
            .await
            .map_err(|e| RpcError::unreachable(format!("send failed: {e}")))?;
        let reply = read_frame(&mut conn).await?;
        Ok((conn, reply))
    }
}

impl Transport for SocketTransport {
    async fn call(&self, request: Request) -> Result<Reply, RpcError> {
        let frame = ClientFrame::Call { request };
        let (_, reply) = tokio::time::timeout(CALL_TIMEOUT, self.exchange(&frame))
            .await
            .map_err(|_| RpcError::unreachable("timed out waiting for the daemon"))??;
        match reply {
            ServerFrame::Reply { reply } => Ok(reply),
            ServerFrame::Error { error } => Err(error),
            other => Err(RpcError::Protocol(format!("unexpected frame {other:?}"))),
        }
    }

    async fn subscribe(&self, keepalive: bool) -> Result<SignalReceiver, RpcError> {
        let frame = ClientFrame::Subscribe { keepalive };
        let (mut conn, ack) = tokio::time::timeout(CALL_TIMEOUT, self.exchange(&frame))
            .await
            .map_err(|_| RpcError::unreachable("timed out waiting for the daemon"))??;
        if ack != ServerFrame::Subscribed {
            return Err(RpcError::Protocol(format!("unexpected frame {ack:?}")));
        }

        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = tx.closed() => break,
                    frame = read_frame(&mut conn) => frame,
                };
                match frame {
                    Ok(ServerFrame::Signal { signal }) => {
                        trace!(%signal, "signal from daemon");
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                    Ok(other) => debug!(?other, "ignoring frame on signal stream"),
                    Err(e) => {
                        debug!(error = %e, "signal stream ended");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }
}

async fn read_frame(conn: &mut Connection) -> Result<ServerFrame, RpcError> {
    match conn.next().await {
        Some(Ok(line)) => Ok(wire::decode(&line)?),
        Some(Err(e)) => Err(RpcError::unreachable(format!("read failed: {e}"))),
        None => Err(RpcError::unreachable("daemon closed the connection")),
    }
}
