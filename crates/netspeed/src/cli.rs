//! Clap derive structures for the `netspeed` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// netspeed -- live network speed indicator
#[derive(Debug, Parser)]
#[command(
    name = "netspeed",
    version,
    about = "Show live network speed in an indicator",
    long_about = "Runs the network speed indicator service and controls it.\n\n\
        `netspeed daemon` hosts the service; every other command talks to the\n\
        daemon over its control socket.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Preference file (defaults to the platform config directory)
    #[arg(long, env = "NETSPEED_PREFS", global = true)]
    pub prefs: Option<PathBuf>,

    /// Daemon control socket
    #[arg(long, env = "NETSPEED_SOCKET", global = true)]
    pub socket: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl GlobalOpts {
    pub fn prefs_path(&self) -> PathBuf {
        self.prefs.clone().unwrap_or_else(netspeed_config::prefs_path)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(netspeed_config::socket_path)
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Host the indicator service and its control socket
    Daemon(DaemonArgs),

    /// Turn monitoring on
    Start,

    /// Turn monitoring off and close the indicator
    Stop,

    /// Flip monitoring on or off
    Toggle,

    /// Show the service state
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Read and change preferences
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Let the service run without a foreground indicator
    DropForeground,

    /// Report a display state change to the service
    Screen(ScreenArgs),

    /// Hold the keepalive permission until interrupted
    Keepalive,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Daemon ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DaemonArgs {
    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Ignore the auto_start preference for this launch
    #[arg(long)]
    pub no_auto_start: bool,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print the raw report as JSON
    #[arg(long)]
    pub json: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print every preference
    Show,

    /// Print one preference
    Get {
        /// Preference key (e.g. interval, mode, hide_threshold)
        key: String,
    },

    /// Change one preference and push it to a running service
    Set {
        /// Preference key (e.g. interval, mode, hide_threshold)
        key: String,
        /// New value
        value: String,
    },

    /// Print the preference file location
    Path,
}

// ── Screen ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScreenArgs {
    pub state: ScreenState,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScreenState {
    /// Display turned on: resume sampling
    On,
    /// Display turned off: pause sampling
    Off,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: Shell,
}
