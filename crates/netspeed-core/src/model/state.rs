use serde::{Deserialize, Serialize};
use strum::Display;

use super::sample::RateSample;

/// Publish mode of the indicator service.
///
/// `ForegroundVisible` and `BackgroundBound` are mutually exclusive by
/// construction: a single instance holds exactly one mode at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceMode {
    #[default]
    Stopped,
    Starting,
    /// The indicator must stay published while in this mode.
    ForegroundVisible,
    /// Kept alive by a keepalive binding; no indicator obligation.
    BackgroundBound,
}

impl ServiceMode {
    pub fn is_running(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Observable runtime state of one service instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRuntimeState {
    pub mode: ServiceMode,
    /// The speed has stayed below the hide threshold for a full
    /// debounce window.
    pub suppressed: bool,
    /// Sampling is paused (display off).
    pub paused: bool,
    pub last_rates: RateSample,
}
