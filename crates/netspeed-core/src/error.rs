// ── Core error types ──
//
// Errors surfaced by netspeed-core. Cross-process failures have their
// own type (`RpcError`) so callers can treat an unreachable peer as a
// soft notice instead of a failure of their own state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lifecycle contract ───────────────────────────────────────────
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Preference store error: {message}")]
    Store { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // ── Control plane ────────────────────────────────────────────────
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed read of the cumulative interface counters.
///
/// Always treated as transient by the sampler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("no network interfaces visible")]
    NoInterfaces,

    #[error("{0}")]
    Unavailable(String),
}

/// Failure of a one-way call across the process boundary.
///
/// Travels over the control socket as `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum RpcError {
    /// The remote side is not running, not bound, or went away mid-call.
    #[error("Indicator service unreachable: {reason}")]
    Unreachable { reason: String },

    /// The remote side answered with something this build cannot read.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side rejected the request.
    #[error("Rejected by indicator service: {0}")]
    Rejected(String),
}

impl RpcError {
    pub(crate) fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }

    /// `true` if the peer could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl From<WireError> for RpcError {
    fn from(e: WireError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Control-socket frame that could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The peer speaks a newer protocol and sent something this build
    /// cannot read.
    #[error("unsupported protocol version {version} (this build speaks {supported})")]
    UnsupportedVersion { version: u32, supported: u32 },

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
