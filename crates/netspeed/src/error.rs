//! CLI error types with miette diagnostics.
//!
//! Maps core, transport and preference errors into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use netspeed_config::ConfigError;
use netspeed_core::{CoreError, RpcError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the netspeed daemon at {socket}")]
    #[diagnostic(
        code(netspeed::daemon_unreachable),
        help(
            "Start it with: netspeed daemon\n\
             Or point at another socket with --socket / NETSPEED_SOCKET.\n\
             Cause: {reason}"
        )
    )]
    DaemonUnreachable { socket: String, reason: String },

    #[error("Another netspeed daemon is already listening on {socket}")]
    #[diagnostic(code(netspeed::daemon_running))]
    DaemonRunning { socket: String },

    // ── Service ──────────────────────────────────────────────────────
    #[error("Indicator service refused the request: {message}")]
    #[diagnostic(code(netspeed::rejected))]
    Rejected { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(netspeed::validation),
        help("Run: netspeed config show to see every key and its current value")
    )]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Preference file error: {message}")]
    #[diagnostic(code(netspeed::prefs), help("File: {path}"))]
    Prefs { path: String, message: String },

    #[error("Unknown preference key '{key}'")]
    #[diagnostic(code(netspeed::unknown_key), help("Known keys: {known}"))]
    UnknownKey { key: String, known: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(netspeed::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(netspeed::core))]
    Core(CoreError),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DaemonUnreachable { .. } => exit_code::CONNECTION,
            Self::DaemonRunning { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::UnknownKey { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the socket path to an RPC failure.
    pub fn from_rpc(err: RpcError, socket: &std::path::Path) -> Self {
        match err {
            RpcError::Unreachable { reason } => Self::DaemonUnreachable {
                socket: socket.display().to_string(),
                reason,
            },
            other => Self::Rejected {
                message: other.to_string(),
            },
        }
    }

    /// Attach the preference file path to a preference failure.
    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Prefs {
                path: path.display().to_string(),
                message: other.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            CoreError::Rpc(e) => Self::Rejected {
                message: e.to_string(),
            },
            CoreError::Io(e) => Self::Io(e),
            other => Self::Core(other),
        }
    }
}
