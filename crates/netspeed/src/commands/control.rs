//! Commands that drive the running service through the control socket.

use std::fmt::Write as _;

use netspeed_core::ipc::SocketTransport;
use netspeed_core::{PreferenceStore, RpcError, ServiceController, Signal, StatusReport};

use crate::cli::{Command, GlobalOpts, ScreenState, StatusArgs};
use crate::error::CliError;
use crate::indicator::format_rate;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let (controller, store) = super::connect(global);
    let rpc = |e: RpcError| CliError::from_rpc(e, controller.transport().path());

    match cmd {
        Command::Start => {
            store.set_status(true)?;
            controller.start_service(false).await.map_err(rpc)?;
            println!("monitoring on");
        }
        Command::Stop => {
            stop(&controller, &*store).await.map_err(rpc)?;
            println!("monitoring off");
        }
        Command::Toggle => {
            if store.status() {
                stop(&controller, &*store).await.map_err(rpc)?;
                println!("monitoring off");
            } else {
                store.set_status(true)?;
                controller.start_service(false).await.map_err(rpc)?;
                println!("monitoring on");
            }
        }
        Command::Status(args) => {
            let report = controller.status().await.map_err(rpc)?;
            print_status(&report, &args)?;
        }
        Command::DropForeground => controller.drop_foreground().await.map_err(rpc)?,
        Command::Screen(args) => {
            let signal = match args.state {
                ScreenState::On => Signal::ScreenOn,
                ScreenState::Off => Signal::ScreenOff,
            };
            controller.broadcast(signal).await.map_err(rpc)?;
        }
        Command::Daemon(_) | Command::Config(_) | Command::Keepalive | Command::Completions(_) => {
            unreachable!("handled before dispatch")
        }
    }
    Ok(())
}

/// The flag goes down first so a dead daemon does not auto-start later.
async fn stop(
    controller: &ServiceController<SocketTransport>,
    store: &dyn PreferenceStore,
) -> Result<(), RpcError> {
    if let Err(e) = store.set_status(false) {
        tracing::warn!(error = %e, "failed to clear status flag");
    }
    controller.stop_service().await
}

fn print_status(report: &StatusReport, args: &StatusArgs) -> Result<(), CliError> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    print!("{}", format_status(report));
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

pub(crate) fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let state = &report.state;
    let _ = writeln!(out, "service:     {}", state.mode);
    let _ = writeln!(
        out,
        "monitoring:  {}",
        if report.status_flag { "on" } else { "off" }
    );
    let _ = writeln!(out, "keepalive:   {}", yes_no(report.keepalive));
    let _ = writeln!(out, "bindings:    {}", report.bindings);
    if let Some(since) = report.started_at {
        let local = since.with_timezone(&chrono::Local);
        let _ = writeln!(out, "since:       {}", local.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(cfg) = &report.configuration {
        let _ = writeln!(
            out,
            "rates:       ↓ {}  ↑ {}",
            format_rate(state.last_rates.rx_rate, cfg.min_unit),
            format_rate(state.last_rates.tx_rate, cfg.min_unit)
        );
        let _ = writeln!(out, "interval:    {} ms", cfg.interval_ms);
        let _ = writeln!(out, "mode:        {}", cfg.mode);
    }
    let _ = writeln!(out, "suppressed:  {}", yes_no(state.suppressed));
    let _ = writeln!(out, "paused:      {}", yes_no(state.paused));
    out
}
