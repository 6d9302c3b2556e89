//! Durable preferences for netspeed.
//!
//! A flat TOML file of stable keys (`status`, `interval`, `mode`, ...)
//! that survives restarts, path resolution for it and for the daemon's
//! control socket, and a [`TomlStore`] implementing the core
//! [`PreferenceStore`] contract on top of it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use netspeed_core::{Configuration, CoreError, MinUnit, Mode, PreferenceStore};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize preferences: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("preference loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CoreError::Validation { field, reason },
            other => CoreError::Store {
                message: other.to_string(),
            },
        }
    }
}

// ── Preferences ─────────────────────────────────────────────────────

/// Every stable preference key, in file order.
pub const KEYS: &[&str] = &[
    "status",
    "dont_ask_notify",
    "auto_start",
    "interval",
    "mode",
    "hide_threshold",
    "hide_notification",
    "hide_on_locked_screen",
    "notify_clickable",
    "quick_closeable",
    "min_unit",
    "usage",
    "usage_just_mobile",
];

/// Environment prefix for overrides (`NETSPEED_INTERVAL=500`).
pub const ENV_PREFIX: &str = "NETSPEED_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Preferences {
    /// Monitoring is supposed to be running.
    pub status: bool,
    /// Never ask for the notification permission again.
    pub dont_ask_notify: bool,
    /// Start monitoring when the daemon launches (if `status` is set).
    pub auto_start: bool,
    /// Sampling period in milliseconds.
    pub interval: u32,
    pub mode: Mode,
    /// Bytes per second below which the indicator is blanked.
    pub hide_threshold: u64,
    pub hide_notification: bool,
    pub hide_on_locked_screen: bool,
    pub notify_clickable: bool,
    pub quick_closeable: bool,
    pub min_unit: MinUnit,
    pub usage: bool,
    pub usage_just_mobile: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        let configuration = Configuration::default();
        Self {
            status: false,
            dont_ask_notify: false,
            auto_start: false,
            interval: configuration.interval_ms,
            mode: configuration.mode,
            hide_threshold: configuration.hide_threshold,
            hide_notification: configuration.hide_notification,
            hide_on_locked_screen: configuration.hide_on_locked_screen,
            notify_clickable: configuration.notify_clickable,
            quick_closeable: configuration.quick_closeable,
            min_unit: configuration.min_unit,
            usage: configuration.usage,
            usage_just_mobile: configuration.usage_just_mobile,
        }
    }
}

impl Preferences {
    /// The indicator configuration these preferences describe.
    pub fn configuration(&self) -> Configuration {
        Configuration {
            interval_ms: self.interval,
            mode: self.mode,
            hide_threshold: self.hide_threshold,
            hide_notification: self.hide_notification,
            hide_on_locked_screen: self.hide_on_locked_screen,
            notify_clickable: self.notify_clickable,
            quick_closeable: self.quick_closeable,
            min_unit: self.min_unit,
            usage: self.usage,
            usage_just_mobile: self.usage_just_mobile,
        }
    }

    /// Copy every configuration field in, leaving the flags alone.
    pub fn apply(&mut self, configuration: &Configuration) {
        self.interval = configuration.interval_ms;
        self.mode = configuration.mode;
        self.hide_threshold = configuration.hide_threshold;
        self.hide_notification = configuration.hide_notification;
        self.hide_on_locked_screen = configuration.hide_on_locked_screen;
        self.notify_clickable = configuration.notify_clickable;
        self.quick_closeable = configuration.quick_closeable;
        self.min_unit = configuration.min_unit;
        self.usage = configuration.usage;
        self.usage_just_mobile = configuration.usage_just_mobile;
    }

    /// Current value of `key`, rendered as it would be typed.
    pub fn get(&self, key: &str) -> Option<String> {
        let table = toml::Value::try_from(self).ok()?;
        table.get(key).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set one key from its textual form (`true`, `1500`, `up`, ...).
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        if !KEYS.contains(&key) {
            return Err(ConfigError::Validation {
                field: key.into(),
                reason: format!("unknown preference key (expected one of: {})", KEYS.join(", ")),
            });
        }

        let mut table = match toml::Value::try_from(&*self)? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        table.insert(key.into(), parse_value(raw));
        let updated: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Validation {
                field: key.into(),
                reason: e.message().to_owned(),
            })?;
        updated.configuration().validate().map_err(|e| match e {
            CoreError::Validation { field, reason } => ConfigError::Validation { field, reason },
            other => ConfigError::Validation {
                field: key.into(),
                reason: other.to_string(),
            },
        })?;

        *self = updated;
        Ok(())
    }
}

fn parse_value(raw: &str) -> toml::Value {
    let raw = raw.trim();
    if let Ok(b) = raw.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return toml::Value::Integer(n);
    }
    toml::Value::String(raw.to_ascii_lowercase())
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "netspeed", "netspeed")
}

/// Resolve the preference file via XDG / platform conventions.
pub fn prefs_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("prefs.toml"),
        |dirs| dirs.config_dir().join("prefs.toml"),
    )
}

/// Resolve the daemon's control socket: the runtime dir where the
/// platform has one, the temp dir otherwise.
pub fn socket_path() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.runtime_dir().map(|dir| dir.join("netspeed.sock")))
        .unwrap_or_else(|| {
            let user = std::env::var("USER").unwrap_or_else(|_| "default".into());
            std::env::temp_dir().join(format!("netspeed-{user}.sock"))
        })
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("netspeed");
    p
}

// ── Load / save ─────────────────────────────────────────────────────

/// Load preferences: defaults, then the TOML file, then `NETSPEED_*`.
pub fn load_from(path: &Path) -> Result<Preferences, ConfigError> {
    let prefs = Figment::new()
        .merge(Serialized::defaults(Preferences::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()?;
    Ok(prefs)
}

/// Write preferences as pretty TOML, creating parent directories.
pub fn save_to(path: &Path, prefs: &Preferences) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(prefs)?)?;
    debug!(path = %path.display(), "preferences saved");
    Ok(())
}

// ── TomlStore ───────────────────────────────────────────────────────

/// [`PreferenceStore`] backed by the preference file.
///
/// Every read goes back to disk, so a flag flipped by another process
/// is seen. A file that fails to load falls back to the last good read.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    last_good: Mutex<Preferences>,
}

impl TomlStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = load_from(&path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "unreadable preferences, using defaults");
            Preferences::default()
        });
        Self {
            path,
            last_good: Mutex::new(initial),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Preferences {
        let mut last_good = self.last_good.lock().unwrap_or_else(PoisonError::into_inner);
        match load_from(&self.path) {
            Ok(prefs) => {
                last_good.clone_from(&prefs);
                prefs
            }
            Err(e) => {
                warn!(error = %e, "preferences unreadable, using last good copy");
                last_good.clone()
            }
        }
    }

    /// Load, change, save.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<Preferences, ConfigError> {
        let mut prefs = self.load();
        change(&mut prefs);
        save_to(&self.path, &prefs)?;
        self.last_good
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone_from(&prefs);
        Ok(prefs)
    }
}

impl PreferenceStore for TomlStore {
    fn status(&self) -> bool {
        self.load().status
    }

    fn set_status(&self, status: bool) -> Result<(), CoreError> {
        self.update(|prefs| prefs.status = status)?;
        Ok(())
    }

    fn configuration(&self) -> Configuration {
        self.load().configuration()
    }
}
