// ── Indicator configuration ──
//
// The value object pushed from the control surface into the running
// service. Every field has a default so frames written by an older
// build stay readable after a field is added.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

pub const DEFAULT_INTERVAL_MS: u32 = 1000;
pub const MIN_INTERVAL_MS: u32 = 100;
pub const MAX_INTERVAL_MS: u32 = 60_000;

/// Which direction drives the hide threshold and the indicator.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// The larger of receive and transmit.
    #[default]
    All,
    /// Transmit only.
    Up,
    /// Receive only.
    Down,
}

/// Smallest unit the renderer may scale a rate down to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MinUnit {
    #[default]
    #[strum(to_string = "b", serialize = "byte")]
    #[serde(alias = "byte")]
    B,
    #[strum(to_string = "kb", serialize = "kilo")]
    #[serde(alias = "kilo")]
    Kb,
    #[strum(to_string = "mb", serialize = "mega")]
    #[serde(alias = "mega")]
    Mb,
}

impl MinUnit {
    /// Bytes per one of this unit.
    pub fn bytes(self) -> u64 {
        match self {
            Self::B => 1,
            Self::Kb => 1024,
            Self::Mb => 1024 * 1024,
        }
    }
}

/// Full indicator configuration.
///
/// Compared by value: pushing a configuration equal to the current one
/// is a no-op on the service side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Sampling period in milliseconds.
    pub interval_ms: u32,
    pub mode: Mode,
    /// Below this speed (bytes/sec) the indicator is blanked after the
    /// debounce window. `0` disables hiding.
    pub hide_threshold: u64,
    pub hide_notification: bool,
    pub hide_on_locked_screen: bool,
    pub notify_clickable: bool,
    pub quick_closeable: bool,
    pub min_unit: MinUnit,
    /// Show today's data usage alongside the rate.
    pub usage: bool,
    /// Restrict usage accounting to mobile interfaces.
    pub usage_just_mobile: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            mode: Mode::All,
            hide_threshold: 0,
            hide_notification: false,
            hide_on_locked_screen: true,
            notify_clickable: true,
            quick_closeable: false,
            min_unit: MinUnit::B,
            usage: false,
            usage_just_mobile: false,
        }
    }
}

impl Configuration {
    /// Sampling period, clamped into the supported range.
    pub fn interval(&self) -> Duration {
        let ms = self.interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        Duration::from_millis(u64::from(ms))
    }

    /// Reject values the control surface should never send.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&self.interval_ms) {
            return Err(CoreError::Validation {
                field: "interval".into(),
                reason: format!(
                    "must be between {MIN_INTERVAL_MS} and {MAX_INTERVAL_MS} ms, got {}",
                    self.interval_ms
                ),
            });
        }
        Ok(())
    }
}
