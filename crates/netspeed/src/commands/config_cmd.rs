//! Config subcommand handlers.

use netspeed_config::{KEYS, Preferences, save_to};
use netspeed_core::ServiceController;
use netspeed_core::ipc::SocketTransport;
use tracing::{debug, info};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

/// Keys that are not part of the indicator configuration.
const FLAG_KEYS: &[&str] = &["status", "dont_ask_notify", "auto_start"];

pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.prefs_path();
    let (controller, store) = super::connect(global);

    match args.command {
        ConfigCommand::Show => print!("{}", format_prefs(&store.load())),
        ConfigCommand::Get { key } => {
            let value = store.load().get(&key).ok_or_else(|| unknown_key(&key))?;
            println!("{value}");
        }
        ConfigCommand::Set { key, value } => {
            if !KEYS.contains(&key.as_str()) {
                return Err(unknown_key(&key));
            }
            let mut prefs = store.load();
            prefs
                .set(&key, &value)
                .map_err(|e| CliError::from_config(e, &path))?;
            save_to(&path, &prefs).map_err(|e| CliError::from_config(e, &path))?;
            println!("{key} = {}", prefs.get(&key).unwrap_or(value));

            if !FLAG_KEYS.contains(&key.as_str()) {
                push_to_running_service(&controller, &prefs).await;
            }
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}

/// Best effort: a stopped or unreachable service picks the change up at
/// its next start.
async fn push_to_running_service(
    controller: &ServiceController<SocketTransport>,
    prefs: &Preferences,
) {
    match controller.status().await {
        Ok(report) if report.state.mode.is_running() => {}
        Ok(_) => {
            debug!("service not running, nothing to push");
            return;
        }
        Err(e) => {
            debug!(error = %e, "daemon not reachable, change applies at next start");
            return;
        }
    }
    if controller.bind_service().await.is_ok() {
        if controller
            .push_configuration(prefs.configuration())
            .await
            .is_ok()
        {
            info!("configuration pushed to running service");
        }
        controller.unbind_service().await;
    }
}

fn unknown_key(key: &str) -> CliError {
    CliError::UnknownKey {
        key: key.into(),
        known: KEYS.join(", "),
    }
}

fn format_prefs(prefs: &Preferences) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for key in KEYS {
        if let Some(value) = prefs.get(key) {
            let _ = writeln!(out, "{key} = {value}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_lists_every_key_in_order() {
        let text = format_prefs(&Preferences::default());
        let keys: Vec<_> = text
            .lines()
            .filter_map(|line| line.split(" = ").next())
            .collect();
        assert_eq!(keys, KEYS);
        assert!(text.contains("interval = 1000\n"));
        assert!(text.contains("mode = all\n"));
    }
}
