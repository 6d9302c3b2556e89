//! Indicator-service lifecycle and control plane for `netspeed`.
//!
//! This crate owns everything between the interface counters and the
//! renderer that draws the indicator:
//!
//! - **[`Sampler`]** reads a [`CounterSource`] on a fixed period and
//!   derives [`RateSample`]s against the single retained baseline.
//!
//! - **[`SuppressionPolicy`]** blanks the indicator once the speed has
//!   stayed below the hide threshold for a full debounce window.
//!
//! - **[`ServiceHost`]** is the process-level owner of the indicator
//!   service. Each running instance is a single task that serializes
//!   commands, bus [`Signal`]s, keepalive-permission changes and sampler
//!   ticks, and drives the foreground / background-bound state machine.
//!
//! - **[`ServiceController`]** is the client-side facade a control
//!   surface uses to start, bind, reconfigure and stop the service over
//!   any [`Transport`]: in-process ([`LocalTransport`]) or through the
//!   daemon's control socket ([`ipc::SocketTransport`]).
//!
//! - **[`KeepaliveHost`]** holds the elevated keepalive permission so
//!   the service can run without a foreground indicator, and puts the
//!   service back into foreground mode when it detaches.

pub mod bus;
pub mod controller;
pub mod counter;
pub mod debounce;
pub mod error;
pub mod host;
#[cfg(unix)]
pub mod ipc;
pub mod keepalive;
pub mod model;
pub mod renderer;
pub mod rpc;
pub mod sampler;
mod service;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{EventBus, Signal, Subscription};
pub use controller::{Callback, Notice, ServiceController};
pub use counter::{CounterFactory, CounterSource, SysinfoCounter};
pub use debounce::{DEBOUNCE_WINDOW, SuppressionPolicy};
pub use error::{CoreError, CounterError, RpcError, WireError};
pub use host::{KeepaliveGrant, ServiceHost};
pub use keepalive::{KeepaliveHost, ReconnectConfig};
pub use model::{
    Configuration, MinUnit, Mode, RateSample, ServiceMode, ServiceRuntimeState, ThroughputSample,
};
pub use renderer::{INDICATOR_ID, IndicatorContent, Renderer};
pub use rpc::{BindingId, LocalTransport, Reply, Request, StatusReport, Transport};
pub use sampler::{Sampler, TickOutcome};
pub use store::{MemoryStore, PreferenceStore};
