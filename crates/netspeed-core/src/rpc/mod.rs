// ── Control-plane RPC ──
//
// Typed requests from a control surface to the service host. The same
// types travel in-process (`LocalTransport`) and over the control
// socket (`ipc::SocketTransport`).

pub mod local;

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::bus::Signal;
use crate::error::RpcError;
use crate::model::{Configuration, ServiceRuntimeState};

pub use local::LocalTransport;

/// Handle for one binding to the indicator service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(pub u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One call against the service host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Start (or re-start) the service with the given configuration.
    Start {
        #[serde(default)]
        configuration: Configuration,
    },
    /// Tear the service down and clear the status flag.
    Stop,
    Bind,
    Unbind { binding: BindingId },
    UpdateConfiguration {
        binding: BindingId,
        configuration: Configuration,
    },
    /// Publish a signal on the host's bus.
    Broadcast { signal: Signal },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Bound { binding: BindingId },
    Status(StatusReport),
}

/// Snapshot returned by [`Request::Status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusReport {
    pub state: ServiceRuntimeState,
    /// Configuration of the running instance, if any.
    pub configuration: Option<Configuration>,
    pub started_at: Option<DateTime<Utc>>,
    /// Durable status flag as the host sees it.
    pub status_flag: bool,
    pub keepalive: bool,
    pub bindings: usize,
}

/// Receiving end of a signal subscription. Dropping it unsubscribes.
pub type SignalReceiver = mpsc::Receiver<Signal>;

/// A way to reach the service host.
///
/// Every failure to reach the peer is reported as
/// [`RpcError::Unreachable`]; callers decide whether that matters.
pub trait Transport: Clone + Send + Sync + 'static {
    fn call(&self, request: Request) -> impl Future<Output = Result<Reply, RpcError>> + Send;

    /// Stream bus signals. A `keepalive` subscription also holds the
    /// elevated keepalive permission until it is dropped.
    fn subscribe(
        &self,
        keepalive: bool,
    ) -> impl Future<Output = Result<SignalReceiver, RpcError>> + Send;
}

pub(crate) fn expect_ok(reply: Reply) -> Result<(), RpcError> {
    match reply {
        Reply::Ok | Reply::Bound { .. } => Ok(()),
        Reply::Status(_) => Err(RpcError::Protocol("unexpected status reply".into())),
    }
}

pub(crate) fn expect_binding(reply: Reply) -> Result<BindingId, RpcError> {
    match reply {
        Reply::Bound { binding } => Ok(binding),
        other => Err(RpcError::Protocol(format!("expected binding, got {other:?}"))),
    }
}
