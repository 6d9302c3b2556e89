// ── Control-plane event bus ──
//
// Typed replacement for process-wide broadcasts. Every signal is a
// one-way action identifier; subscribers pick the topics they care
// about and never see the rest.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;
use tracing::warn;

const BUS_CHANNEL_SIZE: usize = 64;

/// Lifecycle signal carried by the bus and over the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Signal {
    /// The indicator service entered its running state.
    Start,
    /// Full teardown requested.
    Close,
    /// Drop the visible-indicator mode.
    StopForeground,
    ScreenOn,
    ScreenOff,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::Start,
        Signal::Close,
        Signal::StopForeground,
        Signal::ScreenOn,
        Signal::ScreenOff,
    ];
}

/// Cheaply cloneable handle to one bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Signal>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CHANNEL_SIZE);
        Self { tx }
    }

    /// Fire-and-forget. Returns how many subscriptions saw it.
    pub fn publish(&self, signal: Signal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    /// Listen for the given topics only.
    pub fn subscribe(&self, topics: &[Signal]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topics: topics.to_vec(),
        }
    }
}

/// Topic-filtered receiver.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Signal>,
    topics: Vec<Signal>,
}

impl Subscription {
    /// Next matching signal, or `None` once the bus is gone.
    ///
    /// A slow subscriber that fell behind skips the lost signals.
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            match self.rx.recv().await {
                Ok(signal) if self.topics.contains(&signal) => return Some(signal),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
