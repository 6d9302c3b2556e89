use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::configuration::Mode;

/// Cumulative interface counters captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub timestamp: Instant,
}

impl ThroughputSample {
    pub fn new(rx_bytes_total: u64, tx_bytes_total: u64, timestamp: Instant) -> Self {
        Self {
            rx_bytes_total,
            tx_bytes_total,
            timestamp,
        }
    }

    /// `true` if either counter went backwards relative to `previous`
    /// (interface reset, reboot, counter wrap).
    pub fn is_reset_from(&self, previous: &ThroughputSample) -> bool {
        self.rx_bytes_total < previous.rx_bytes_total
            || self.tx_bytes_total < previous.tx_bytes_total
    }
}

/// Instantaneous receive/transmit rate in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSample {
    pub rx_rate: u64,
    pub tx_rate: u64,
}

impl RateSample {
    pub const ZERO: Self = Self {
        rx_rate: 0,
        tx_rate: 0,
    };

    pub fn new(rx_rate: u64, tx_rate: u64) -> Self {
        Self { rx_rate, tx_rate }
    }

    /// Derive the rate between two consecutive samples.
    ///
    /// A counter decrease or a non-advancing clock yields zero for the
    /// tick rather than a negative or wrapped value.
    pub fn between(previous: &ThroughputSample, current: &ThroughputSample) -> Self {
        if current.is_reset_from(previous) {
            return Self::ZERO;
        }
        let elapsed = current
            .timestamp
            .saturating_duration_since(previous.timestamp)
            .as_micros();
        if elapsed == 0 {
            return Self::ZERO;
        }
        Self {
            rx_rate: per_second(current.rx_bytes_total - previous.rx_bytes_total, elapsed),
            tx_rate: per_second(current.tx_bytes_total - previous.tx_bytes_total, elapsed),
        }
    }

    /// The speed the hide threshold is compared against for `mode`.
    pub fn speed(&self, mode: Mode) -> u64 {
        match mode {
            Mode::All => self.rx_rate.max(self.tx_rate),
            Mode::Up => self.tx_rate,
            Mode::Down => self.rx_rate,
        }
    }
}

fn per_second(delta_bytes: u64, elapsed_micros: u128) -> u64 {
    let rate = u128::from(delta_bytes) * 1_000_000 / elapsed_micros;
    u64::try_from(rate).unwrap_or(u64::MAX)
}
