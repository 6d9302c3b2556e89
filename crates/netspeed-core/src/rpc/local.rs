use tokio::sync::mpsc;
use tracing::trace;

use crate::bus::Signal;
use crate::error::RpcError;
use crate::host::ServiceHost;

use super::{Reply, Request, SignalReceiver, Transport};

const SIGNAL_BUFFER: usize = 16;

/// In-process transport straight into a [`ServiceHost`].
#[derive(Clone)]
pub struct LocalTransport {
    host: ServiceHost,
}

impl LocalTransport {
    pub fn new(host: ServiceHost) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &ServiceHost {
        &self.host
    }
}

impl Transport for LocalTransport {
    async fn call(&self, request: Request) -> Result<Reply, RpcError> {
        self.host.handle(request).await
    }

    async fn subscribe(&self, keepalive: bool) -> Result<SignalReceiver, RpcError> {
        let mut signals = self.host.bus().subscribe(&Signal::ALL);
        let grant = keepalive.then(|| self.host.grant_keepalive());
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

        tokio::spawn(async move {
            let _grant = grant;
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    signal = signals.recv() => match signal {
                        Some(signal) => {
                            if tx.send(signal).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            trace!("local subscription ended");
        });

        Ok(rx)
    }
}
